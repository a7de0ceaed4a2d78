use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LocatorError, TaskFailure};

/// Number of most recent history entries surfaced to the model.
pub const HISTORY_WINDOW: usize = 5;
/// Cap on the rendered page description inside a prompt.
pub const PAGE_DESCRIPTION_MAX_CHARS: usize = 6000;
/// Result reported by actions that do not produce text.
pub const ACTION_DONE: &str = "Action completed successfully";
/// Upper bound for a numeric `wait` action, in seconds.
pub const MAX_WAIT_SECS: f64 = 60.0;

/// The closed vocabulary of things the model may ask the browser to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Wait,
    Extract,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Navigate,
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Wait,
        ActionKind::Extract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Wait => "wait",
            ActionKind::Extract => "extract",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a [`Locator`] finds its element.
///
/// Deserialization goes through [`FromStr`] so the short aliases models
/// like to emit (`class`, `tag`, `css_selector`, `link`) are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Strategy {
    Id,
    Name,
    Css,
    Xpath,
    LinkText,
    PartialLinkText,
    ClassName,
    TagName,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::Id,
        Strategy::Name,
        Strategy::Css,
        Strategy::Xpath,
        Strategy::LinkText,
        Strategy::PartialLinkText,
        Strategy::ClassName,
        Strategy::TagName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::Css => "css",
            Strategy::Xpath => "xpath",
            Strategy::LinkText => "link_text",
            Strategy::PartialLinkText => "partial_link_text",
            Strategy::ClassName => "class_name",
            Strategy::TagName => "tag_name",
        }
    }
}

impl FromStr for Strategy {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let strategy = match s {
            "id" => Strategy::Id,
            "name" => Strategy::Name,
            "css" | "css_selector" => Strategy::Css,
            "xpath" => Strategy::Xpath,
            "link_text" | "link" => Strategy::LinkText,
            "partial_link_text" => Strategy::PartialLinkText,
            "class_name" | "class" => Strategy::ClassName,
            "tag_name" | "tag" => Strategy::TagName,
            other => return Err(LocatorError::InvalidStrategy(other.to_string())),
        };
        Ok(strategy)
    }
}

impl TryFrom<String> for Strategy {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(strategy, value)` pair naming one page element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
}

impl Locator {
    /// Builds a locator from a strategy name, rejecting unknown strategies
    /// and empty values.
    pub fn new(strategy: &str, value: impl Into<String>) -> Result<Self, LocatorError> {
        let strategy = strategy.parse()?;
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LocatorError::EmptyValue(strategy));
        }
        Ok(Self { strategy, value })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.value)
    }
}

/// What an action operates on.
///
/// `Raw` carries a navigation URL, a default-strategy (CSS) selector, or a
/// wait duration, depending on the action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Raw(String),
    Locator(Locator),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Raw(raw) => f.write_str(raw),
            Target::Locator(locator) => locator.fmt(f),
        }
    }
}

/// A single model-proposed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action", alias = "kind")]
    pub kind: ActionKind,
    pub target: Target,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub explanation: Option<String>,
    #[serde(
        default,
        rename = "task_complete",
        alias = "target_achieved",
        alias = "completion_flag",
        deserialize_with = "lenient_flag"
    )]
    pub completion_flag: bool,
}

impl Action {
    pub fn new(kind: ActionKind, target: Target) -> Self {
        Self {
            kind,
            target,
            value: None,
            explanation: None,
            completion_flag: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(ActionKind::Navigate, Target::Raw(url.into()))
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn completing(mut self) -> Self {
        self.completion_flag = true;
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str().to_uppercase(), self.target)?;
        if let Some(value) = &self.value {
            write!(f, " with value: {value}")?;
        }
        Ok(())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected text, found {other}"
        ))),
    }
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// The model's answer to "where do I start".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialAction {
    Navigate(String),
    Search(String),
}

/// Immutable record of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub kind: ActionKind,
    pub target: Target,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Coarse role of an element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Clickable,
    Input,
    Link,
    #[default]
    Other,
}

/// One element as reported by the browser driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementDescriptor {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub tag: String,
    pub text: String,
    pub id: String,
    pub name: String,
    pub class: String,
    pub input_type: String,
    pub href: Option<String>,
    pub placeholder: Option<String>,
    pub locators: BTreeMap<Strategy, String>,
}

/// Point-in-time view of the page, fetched fresh every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<ElementDescriptor>,
}

/// Terminal value of one task.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded { result: String },
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_aliases_resolve() {
        assert_eq!("class".parse::<Strategy>().unwrap(), Strategy::ClassName);
        assert_eq!("css_selector".parse::<Strategy>().unwrap(), Strategy::Css);
        assert_eq!("tag".parse::<Strategy>().unwrap(), Strategy::TagName);
        assert!(matches!(
            "bogus".parse::<Strategy>(),
            Err(LocatorError::InvalidStrategy(s)) if s == "bogus"
        ));
    }

    #[test]
    fn locator_rejects_empty_value() {
        assert!(matches!(
            Locator::new("id", "  "),
            Err(LocatorError::EmptyValue(Strategy::Id))
        ));
        assert_eq!(Locator::new("name", "q").unwrap().strategy, Strategy::Name);
    }

    #[test]
    fn action_accepts_wire_aliases() {
        let action: Action = serde_json::from_value(json!({
            "kind": "type",
            "target": {"strategy": "name", "value": "q"},
            "value": 42,
            "target_achieved": "true"
        }))
        .unwrap();
        assert_eq!(action.kind, ActionKind::Type);
        assert_eq!(action.value.as_deref(), Some("42"));
        assert!(action.completion_flag);
        assert_eq!(
            action.target,
            Target::Locator(Locator {
                strategy: Strategy::Name,
                value: "q".into()
            })
        );
    }

    #[test]
    fn action_serializes_with_wire_keys() {
        let action = Action::navigate("https://example.com").completing();
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "navigate");
        assert_eq!(value["target"], "https://example.com");
        assert_eq!(value["task_complete"], true);
        assert!(value.get("value").is_none());
    }
}
