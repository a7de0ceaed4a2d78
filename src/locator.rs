//! Element locator resolution.
//!
//! Every strategy is lowered to a CSS selector or an XPath expression, the
//! two lookups a browser can evaluate natively:
//! - `id`, `name`, `class_name`, `tag_name` and bare strings become CSS
//! - `link_text` and `partial_link_text` become XPath over anchors
//!
//! The resolver polls until the element shows up (and, for clicks, until it
//! is interactable) or the timeout elapses. It never retries on its own
//! beyond that wait; retries belong to the navigator.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::driver::{BrowserDriver, ElementHandle, ElementQuery};
use crate::error::LocatorError;
use crate::types::{Locator, Strategy, Target};

/// What the caller needs from the element before it is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Present,
    Interactable,
}

/// Lowers a target into a driver query. Fails before any lookup when the
/// value is empty.
pub fn query_for(target: &Target) -> Result<ElementQuery, LocatorError> {
    let (strategy, value) = match target {
        Target::Raw(raw) => (Strategy::Css, raw.as_str()),
        Target::Locator(Locator { strategy, value }) => (*strategy, value.as_str()),
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(LocatorError::EmptyValue(strategy));
    }

    let query = match strategy {
        Strategy::Css | Strategy::TagName => ElementQuery::Css(value.to_string()),
        Strategy::Id => ElementQuery::Css(format!("[id={}]", css_string(value))),
        Strategy::Name => ElementQuery::Css(format!("[name={}]", css_string(value))),
        Strategy::ClassName => ElementQuery::Css(
            value
                .split_whitespace()
                .map(|class| format!(".{}", css_ident(class)))
                .collect(),
        ),
        Strategy::Xpath => ElementQuery::XPath(value.to_string()),
        Strategy::LinkText => {
            ElementQuery::XPath(format!("//a[normalize-space(.)={}]", xpath_literal(value)))
        }
        Strategy::PartialLinkText => ElementQuery::XPath(format!(
            "//a[contains(normalize-space(.), {})]",
            xpath_literal(value)
        )),
    };
    Ok(query)
}

#[derive(Debug, Clone)]
pub struct LocatorResolver {
    timeout: Duration,
    poll_interval: Duration,
}

impl LocatorResolver {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn resolve<D>(
        &self,
        driver: &mut D,
        target: &Target,
        readiness: Readiness,
    ) -> Result<ElementHandle, LocatorError>
    where
        D: BrowserDriver + ?Sized,
    {
        let query = query_for(target)?;
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut seen = false;

        loop {
            if let Some(handle) = driver.find_element(&query)? {
                seen = true;
                if readiness == Readiness::Present || handle.interactable {
                    debug!("Resolved {} after {:?}", query, started.elapsed());
                    return Ok(handle);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }

        let (strategy, value) = describe(target);
        let waited = started.elapsed();
        if seen {
            Err(LocatorError::Timeout {
                strategy,
                value,
                waited,
            })
        } else {
            Err(LocatorError::ElementNotFound {
                strategy,
                value,
                waited,
            })
        }
    }
}

fn describe(target: &Target) -> (Strategy, String) {
    match target {
        Target::Raw(raw) => (Strategy::Css, raw.clone()),
        Target::Locator(locator) => (locator.strategy, locator.value.clone()),
    }
}

pub(crate) fn css_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub(crate) fn css_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let plain = c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii();
        if !plain || (i == 0 && c.is_ascii_digit()) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// XPath 1.0 has no escape sequences, so mixed quotes need `concat()`.
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    let parts: Vec<String> = value
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::types::ElementDescriptor;

    /// Element appears after `appear_after` probes and becomes clickable
    /// after `clickable_after` probes.
    struct Probe {
        probes: usize,
        appear_after: Option<usize>,
        clickable_after: Option<usize>,
    }

    impl BrowserDriver for Probe {
        fn navigate(&mut self, _url: &str) -> Result<(), DriverError> {
            unreachable!()
        }

        fn find_element(
            &mut self,
            query: &ElementQuery,
        ) -> Result<Option<ElementHandle>, DriverError> {
            self.probes += 1;
            let present = self.appear_after.is_some_and(|n| self.probes > n);
            let interactable = self.clickable_after.is_some_and(|n| self.probes > n);
            Ok(present.then(|| ElementHandle {
                query: query.clone(),
                interactable,
            }))
        }

        fn click(&mut self, _element: &ElementHandle) -> Result<(), DriverError> {
            unreachable!()
        }

        fn type_into(&mut self, _element: &ElementHandle, _text: &str) -> Result<(), DriverError> {
            unreachable!()
        }

        fn read_text(&mut self, _element: &ElementHandle) -> Result<String, DriverError> {
            unreachable!()
        }

        fn current_url(&mut self) -> Result<String, DriverError> {
            unreachable!()
        }

        fn current_title(&mut self) -> Result<String, DriverError> {
            unreachable!()
        }

        fn list_elements(&mut self) -> Result<Vec<ElementDescriptor>, DriverError> {
            unreachable!()
        }
    }

    fn resolver() -> LocatorResolver {
        LocatorResolver::new(Duration::from_millis(60), Duration::from_millis(5))
    }

    fn locator(strategy: Strategy, value: &str) -> Target {
        Target::Locator(Locator {
            strategy,
            value: value.to_string(),
        })
    }

    #[test]
    fn strategies_lower_to_native_queries() {
        let cases = [
            (locator(Strategy::Id, "main"), ElementQuery::Css("[id=\"main\"]".into())),
            (locator(Strategy::Name, "q"), ElementQuery::Css("[name=\"q\"]".into())),
            (locator(Strategy::Css, "#submit"), ElementQuery::Css("#submit".into())),
            (locator(Strategy::TagName, "h1"), ElementQuery::Css("h1".into())),
            (
                locator(Strategy::ClassName, "btn primary"),
                ElementQuery::Css(".btn.primary".into()),
            ),
            (
                locator(Strategy::Xpath, "//button[1]"),
                ElementQuery::XPath("//button[1]".into()),
            ),
            (
                locator(Strategy::LinkText, "Sign in"),
                ElementQuery::XPath("//a[normalize-space(.)=\"Sign in\"]".into()),
            ),
            (
                locator(Strategy::PartialLinkText, "Sign"),
                ElementQuery::XPath("//a[contains(normalize-space(.), \"Sign\")]".into()),
            ),
            (Target::Raw("input.search".into()), ElementQuery::Css("input.search".into())),
        ];
        for (target, expected) in cases {
            assert_eq!(query_for(&target).unwrap(), expected, "{target}");
        }
    }

    #[test]
    fn blank_values_fail_before_lookup() {
        assert!(matches!(
            query_for(&Target::Raw("   ".into())),
            Err(LocatorError::EmptyValue(Strategy::Css))
        ));
    }

    #[test]
    fn quoting_survives_awkward_values() {
        assert_eq!(css_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(css_ident("2col"), "\\2col");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal(r#"say "hi""#), r#"'say "hi"'"#);
        assert_eq!(
            xpath_literal(r#"it's "x""#),
            r#"concat("it's ", '"', "x", '"', "")"#
        );
    }

    #[test]
    fn waits_until_element_appears() {
        let mut driver = Probe {
            probes: 0,
            appear_after: Some(3),
            clickable_after: None,
        };
        let handle = resolver()
            .resolve(&mut driver, &locator(Strategy::Name, "q"), Readiness::Present)
            .unwrap();
        assert_eq!(handle.query, ElementQuery::Css("[name=\"q\"]".into()));
        assert_eq!(driver.probes, 4);
    }

    #[test]
    fn missing_element_reports_not_found() {
        let mut driver = Probe {
            probes: 0,
            appear_after: None,
            clickable_after: None,
        };
        let err = resolver()
            .resolve(&mut driver, &Target::Raw("#nope".into()), Readiness::Present)
            .unwrap_err();
        assert!(matches!(err, LocatorError::ElementNotFound { strategy: Strategy::Css, .. }));
        assert!(driver.probes > 1);
    }

    #[test]
    fn present_but_never_clickable_times_out() {
        let mut driver = Probe {
            probes: 0,
            appear_after: Some(0),
            clickable_after: None,
        };
        let err = resolver()
            .resolve(&mut driver, &locator(Strategy::Id, "go"), Readiness::Interactable)
            .unwrap_err();
        assert!(matches!(err, LocatorError::Timeout { strategy: Strategy::Id, .. }));
    }

    #[test]
    fn click_waits_for_interactable() {
        let mut driver = Probe {
            probes: 0,
            appear_after: Some(0),
            clickable_after: Some(2),
        };
        let handle = resolver()
            .resolve(&mut driver, &locator(Strategy::Id, "go"), Readiness::Interactable)
            .unwrap();
        assert!(handle.interactable);
        assert_eq!(driver.probes, 3);
    }
}
