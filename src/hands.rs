use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::dom;
use crate::driver::{BrowserDriver, ElementHandle, ElementQuery};
use crate::error::DriverError;
use crate::types::ElementDescriptor;

const INTERACTABLE_JS: &str = r#"function() {
  const r = this.getBoundingClientRect();
  const s = getComputedStyle(this);
  return !this.disabled && r.width > 0 && r.height > 0
    && s.visibility !== 'hidden' && s.pointerEvents !== 'none';
}"#;

const CLEAR_JS: &str = "function() { if ('value' in this) { this.value = ''; } }";

/// One Chrome tab owned by one task.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(settings: &BrowserSettings) -> Result<Self, DriverError> {
        let browser = match &settings.debug_url {
            Some(url) => {
                info!("[Hands] Attaching to existing Chrome at {}", url);
                Browser::connect(url.clone()).map_err(|e| DriverError::Launch(format!("{e:#}")))?
            }
            None => {
                let options = LaunchOptions {
                    headless: settings.headless,
                    sandbox: settings.sandbox,
                    path: settings.chrome_path.clone().or_else(find_chrome),
                    args: vec![
                        OsStr::new("--no-first-run"),
                        OsStr::new("--no-default-browser-check"),
                        OsStr::new("--disable-dev-shm-usage"),
                        OsStr::new("--disable-blink-features=AutomationControlled"),
                    ],
                    idle_browser_timeout: settings.page_timeout.max(Duration::from_secs(60)),
                    ..Default::default()
                };
                info!("[Hands] Launching Chrome (headless: {})", settings.headless);
                Browser::new(options).map_err(|e| DriverError::Launch(format!("{e:#}")))?
            }
        };

        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Launch(format!("could not open tab: {e:#}")))?;
        tab.set_default_timeout(settings.page_timeout);
        info!("[Hands] Chrome ready.");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn locate(&self, query: &ElementQuery) -> anyhow::Result<Element<'_>> {
        match query {
            ElementQuery::Css(selector) => self.tab.find_element(selector),
            ElementQuery::XPath(xpath) => self.tab.find_element_by_xpath(xpath),
        }
    }

    /// Re-finds a previously resolved element; the page may have re-rendered.
    fn element(
        &self,
        handle: &ElementHandle,
        operation: &'static str,
    ) -> Result<Element<'_>, DriverError> {
        self.locate(&handle.query)
            .map_err(|e| DriverError::operation(operation, format!("{} ({e:#})", handle.query)))
    }
}

impl BrowserDriver for BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        info!("[Hands] Navigating to: {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;
        Ok(())
    }

    fn find_element(&mut self, query: &ElementQuery) -> Result<Option<ElementHandle>, DriverError> {
        let element = match self.locate(query) {
            Ok(element) => element,
            Err(e) => {
                debug!("[Hands] {} not present yet: {:#}", query, e);
                return Ok(None);
            }
        };
        let interactable = element
            .call_js_fn(INTERACTABLE_JS, vec![], false)
            .ok()
            .and_then(|object| object.value)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        Ok(Some(ElementHandle {
            query: query.clone(),
            interactable,
        }))
    }

    fn click(&mut self, handle: &ElementHandle) -> Result<(), DriverError> {
        let element = self.element(handle, "click")?;
        element
            .click()
            .map_err(|e| DriverError::operation("click", format!("{e:#}")))?;
        Ok(())
    }

    fn type_into(&mut self, handle: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let element = self.element(handle, "type")?;
        if let Err(e) = element.call_js_fn(CLEAR_JS, vec![], false) {
            warn!("[Hands] Could not clear {}: {:#}", handle.query, e);
        }
        element
            .type_into(text)
            .map_err(|e| DriverError::operation("type", format!("{e:#}")))?;
        Ok(())
    }

    fn read_text(&mut self, handle: &ElementHandle) -> Result<String, DriverError> {
        let element = self.element(handle, "extract")?;
        element
            .get_inner_text()
            .map_err(|e| DriverError::operation("extract", format!("{e:#}")))
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.tab.get_url())
    }

    fn current_title(&mut self) -> Result<String, DriverError> {
        self.tab
            .get_title()
            .map_err(|e| DriverError::operation("read title", format!("{e:#}")))
    }

    fn list_elements(&mut self) -> Result<Vec<ElementDescriptor>, DriverError> {
        let result = self
            .tab
            .evaluate(dom::ELEMENTS_JS, false)
            .map_err(|e| DriverError::operation("list elements", format!("{e:#}")))?;
        let raw = result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "[]".to_string());
        dom::parse_elements(&raw)
    }
}

/// Well-known install locations; `None` lets headless_chrome search on its own.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }
    candidates.into_iter().find(|p| p.exists())
}
