//! Turns free-form model text into a batch of validated actions.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ParseFailure, TaskFailure};
use crate::schema;
use crate::types::{Action, InitialAction};

/// Fail-open entry point: never errors, substituting the fallback action
/// when the response cannot be used.
pub fn parse(raw: &str, fallback_url: &str) -> Vec<Action> {
    try_parse(raw).unwrap_or_else(|failure| {
        warn!("Falling back to {}: {}", fallback_url, failure);
        vec![fallback_action(fallback_url)]
    })
}

/// The single place the fallback action is built.
pub fn fallback_action(fallback_url: &str) -> Action {
    let mut action = Action::navigate(fallback_url);
    action.explanation = Some("model response could not be used".to_string());
    action
}

/// Decodes and validates a whole batch. Any invalid member rejects the
/// batch, since later actions may depend on earlier ones.
pub fn try_parse(raw: &str) -> Result<Vec<Action>, ParseFailure> {
    let candidates = match decode(raw)? {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => return Err(ParseFailure::WrongShape),
    };
    if candidates.is_empty() {
        return Err(ParseFailure::Empty);
    }

    candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            schema::check(&candidate)
                .map_err(|violation| ParseFailure::Invalid { index, violation })?;
            serde_json::from_value::<Action>(candidate)
                .map_err(|e| ParseFailure::Undecodable(e.to_string()))
        })
        .collect()
}

/// Reads the model's first decision: navigate to a URL or search for a query.
/// There is no fallback here.
pub fn parse_initial(raw: &str) -> Result<InitialAction, TaskFailure> {
    let invalid = |reason: String| TaskFailure::InvalidInitialAction(reason);

    let decoded = decode(raw).map_err(|e| invalid(e.to_string()))?;
    let object = match decoded {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    let object = object
        .as_object()
        .ok_or_else(|| invalid("response is not a JSON object".to_string()))?;

    let kind = object
        .get("action")
        .or_else(|| object.get("kind"))
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing `action`".to_string()))?;
    let target = object
        .get("target")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("missing or non-text `target`".to_string()))?;

    match kind {
        "navigate" => Ok(InitialAction::Navigate(target.to_string())),
        "search" => Ok(InitialAction::Search(target.to_string())),
        other => Err(invalid(format!("unsupported initial action type `{other}`"))),
    }
}

/// Direct decode first, then one retry from whichever of `[` or `{` comes
/// first, ignoring any prose before it and anything after the first complete
/// JSON value. Later starts are never tried: they may sit inside the batch.
fn decode(raw: &str) -> Result<Value, ParseFailure> {
    let cleaned = strip_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    let start = cleaned.find(['[', '{']).ok_or(ParseFailure::NoJson)?;
    let mut stream = serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            debug!("Recovered JSON starting at byte {}", start);
            Ok(value)
        }
        Some(Err(e)) => Err(ParseFailure::Undecodable(e.to_string())),
        None => Err(ParseFailure::Undecodable("unexpected end of input".to_string())),
    }
}

fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaViolation;
    use crate::types::{ActionKind, Locator, Strategy, Target};

    const FALLBACK: &str = "https://fallback.test";

    #[test]
    fn prose_without_json_falls_back() {
        for raw in ["", "I think we should click the button.", "null", "42", "[1, 2"] {
            let actions = parse(raw, FALLBACK);
            assert_eq!(actions.len(), 1, "input {raw:?}");
            assert_eq!(actions[0].kind, ActionKind::Navigate);
            assert_eq!(actions[0].target, Target::Raw(FALLBACK.into()));
            assert!(schema::validate_action(&actions[0]));
        }
    }

    #[test]
    fn failure_kinds_are_distinguished() {
        assert_eq!(try_parse("no json here"), Err(ParseFailure::NoJson));
        assert_eq!(try_parse("[]"), Err(ParseFailure::Empty));
        assert_eq!(try_parse("\"click\""), Err(ParseFailure::WrongShape));
        assert!(matches!(try_parse("{\"action\": "), Err(ParseFailure::Undecodable(_))));
    }

    #[test]
    fn leading_and_trailing_prose_is_tolerated() {
        let raw = r##"Sure! Here is the plan:
[{"action": "click", "target": {"strategy": "css", "value": "#submit"}}]
Let me know if that works."##;
        let actions = try_parse(raw).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Click);
    }

    #[test]
    fn bracketed_prose_never_yields_part_of_a_batch() {
        let raw = r##"Plan [draft]:
[{"action": "type", "target": "#q", "value": "rust"}, {"action": "click", "target": "#go"}]"##;
        assert!(matches!(try_parse(raw), Err(ParseFailure::Undecodable(_))));
        assert_eq!(parse(raw, FALLBACK), vec![fallback_action(FALLBACK)]);
    }

    #[test]
    fn fenced_response_is_accepted() {
        let raw = "```json\n{\"action\": \"navigate\", \"target\": \"https://example.com\"}\n```";
        assert_eq!(try_parse(raw).unwrap(), vec![Action::navigate("https://example.com")]);
    }

    #[test]
    fn single_object_is_wrapped_and_backfilled() {
        let actions = try_parse(r##"{"action": "extract", "target": "#price"}"##).unwrap();
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.value, None);
        assert_eq!(action.explanation, None);
        assert!(!action.completion_flag);
    }

    #[test]
    fn one_invalid_action_rejects_the_batch() {
        let raw = r#"[
            {"action": "type", "target": {"strategy": "name", "value": "q"}, "value": "rust"},
            {"action": "type", "target": {"strategy": "name", "value": "q"}},
            {"action": "click", "target": {"strategy": "name", "value": "btnK"}}
        ]"#;
        assert_eq!(
            try_parse(raw),
            Err(ParseFailure::Invalid {
                index: 1,
                violation: SchemaViolation::MissingTypeValue
            })
        );
        assert_eq!(parse(raw, FALLBACK), vec![fallback_action(FALLBACK)]);
    }

    #[test]
    fn batch_order_is_preserved() {
        let raw = r#"[
            {"action": "type", "target": {"strategy": "name", "value": "q"}, "value": "web navigator"},
            {"action": "click", "target": {"strategy": "name", "value": "btnK"}, "task_complete": true}
        ]"#;
        let actions = try_parse(raw).unwrap();
        assert_eq!(actions[0].kind, ActionKind::Type);
        assert_eq!(actions[0].value.as_deref(), Some("web navigator"));
        assert_eq!(
            actions[1].target,
            Target::Locator(Locator {
                strategy: Strategy::Name,
                value: "btnK".into()
            })
        );
        assert!(actions[1].completion_flag);
    }

    #[test]
    fn initial_action_navigate_and_search() {
        assert_eq!(
            parse_initial(
                r#"{"action": "navigate", "target": "https://example.com", "explanation": "site"}"#
            )
            .unwrap(),
            InitialAction::Navigate("https://example.com".into())
        );
        assert_eq!(
            parse_initial(r#"Here you go: [{"action": "search", "target": "rust tutorials"}]"#)
                .unwrap(),
            InitialAction::Search("rust tutorials".into())
        );
    }

    #[test]
    fn initial_action_has_no_fallback() {
        for raw in [
            "nothing useful",
            r##"{"action": "click", "target": "#go"}"##,
            r#"{"action": "navigate"}"#,
            r#"{"action": "navigate", "target": {"strategy": "id", "value": "x"}}"#,
        ] {
            assert!(
                matches!(parse_initial(raw), Err(TaskFailure::InvalidInitialAction(_))),
                "input {raw:?}"
            );
        }
    }
}
