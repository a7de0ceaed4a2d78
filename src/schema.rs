//! Structural validation of model-proposed actions.
//!
//! Rules are checked in order and the first failure wins. Validation is
//! pure: nothing here touches the browser or mutates its input.

use serde_json::{Map, Value};

use crate::error::SchemaViolation;
use crate::types::{Action, ActionKind, Strategy, Target};

/// Returns `true` when `action` is a well-formed action mapping.
pub fn validate(action: &Value) -> bool {
    check(action).is_ok()
}

/// Like [`validate`], but reports which rule failed.
pub fn check(action: &Value) -> Result<(), SchemaViolation> {
    let object = action.as_object().ok_or(SchemaViolation::NotAnObject)?;

    let kind = field(object, "action", "kind").ok_or(SchemaViolation::MissingField("action"))?;
    let target = object
        .get("target")
        .ok_or(SchemaViolation::MissingField("target"))?;

    let kind = match kind.as_str() {
        Some(name) => name
            .parse::<ActionKind>()
            .map_err(SchemaViolation::UnknownKind)?,
        None => return Err(SchemaViolation::UnknownKind(kind.to_string())),
    };

    check_target(target)?;

    if kind == ActionKind::Type && object.get("value").is_none_or(Value::is_null) {
        return Err(SchemaViolation::MissingTypeValue);
    }

    Ok(())
}

fn field<'a>(object: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| object.get(alias))
}

fn check_target(target: &Value) -> Result<(), SchemaViolation> {
    match target {
        Value::String(_) => Ok(()),
        Value::Object(locator) => {
            let strategy = locator
                .get("strategy")
                .ok_or(SchemaViolation::MissingField("target.strategy"))?;
            let value = locator
                .get("value")
                .ok_or(SchemaViolation::MissingField("target.value"))?;

            let name = strategy
                .as_str()
                .ok_or_else(|| SchemaViolation::UnknownStrategy(strategy.to_string()))?;
            if name.parse::<Strategy>().is_err() {
                return Err(SchemaViolation::UnknownStrategy(name.to_string()));
            }

            match value.as_str() {
                Some(v) if !v.trim().is_empty() => Ok(()),
                _ => Err(SchemaViolation::EmptyLocatorValue),
            }
        }
        _ => Err(SchemaViolation::BadTarget),
    }
}

/// Re-checks an already typed action. The type system covers the kind and
/// strategy rules, so only the value-level invariants remain.
pub fn check_action(action: &Action) -> Result<(), SchemaViolation> {
    if let Target::Locator(locator) = &action.target {
        if locator.value.trim().is_empty() {
            return Err(SchemaViolation::EmptyLocatorValue);
        }
    }
    if action.kind == ActionKind::Type && action.value.is_none() {
        return Err(SchemaViolation::MissingTypeValue);
    }
    Ok(())
}

pub fn validate_action(action: &Action) -> bool {
    check_action(action).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn typing() -> Value {
        json!({
            "action": "type",
            "target": {"strategy": "name", "value": "q"},
            "value": "hello"
        })
    }

    #[test]
    fn type_action_requires_value() {
        let mut action = typing();
        assert!(validate(&action));

        action.as_object_mut().unwrap().remove("value");
        assert!(!validate(&action));
        assert_eq!(check(&action), Err(SchemaViolation::MissingTypeValue));
    }

    #[test]
    fn validation_is_idempotent() {
        let action = typing();
        let before = action.clone();
        assert!(validate(&action));
        assert!(validate(&action));
        assert_eq!(action, before);
    }

    #[test]
    fn rules_short_circuit_in_order() {
        assert_eq!(check(&json!("click")), Err(SchemaViolation::NotAnObject));
        assert_eq!(
            check(&json!({"target": "#a"})),
            Err(SchemaViolation::MissingField("action"))
        );
        assert_eq!(
            check(&json!({"action": "scroll"})),
            Err(SchemaViolation::MissingField("target"))
        );
        assert_eq!(
            check(&json!({"action": "scroll", "target": "#a"})),
            Err(SchemaViolation::UnknownKind("scroll".into()))
        );
        assert_eq!(
            check(&json!({"action": "click", "target": 7})),
            Err(SchemaViolation::BadTarget)
        );
    }

    #[test]
    fn locator_targets_are_checked() {
        assert_eq!(
            check(&json!({"action": "type", "target": {"strategy": "bogus", "value": "x"}, "value": "v"})),
            Err(SchemaViolation::UnknownStrategy("bogus".into()))
        );
        assert_eq!(
            check(&json!({"action": "click", "target": {"strategy": "id"}})),
            Err(SchemaViolation::MissingField("target.value"))
        );
        assert_eq!(
            check(&json!({"action": "click", "target": {"strategy": "id", "value": ""}})),
            Err(SchemaViolation::EmptyLocatorValue)
        );
        assert!(validate(
            &json!({"action": "extract", "target": {"strategy": "class", "value": "price"}})
        ));
    }

    #[test]
    fn typed_action_rechecks_invariants() {
        let action = Action::new(ActionKind::Type, Target::Raw("#q".into()));
        assert!(!validate_action(&action));
        assert!(validate_action(&action.with_value("rust")));
    }
}
