//! Error taxonomy.
//!
//! Everything except [`TaskFailure`] is recovered inside the navigation loop
//! as a retry-counter increment; only `TaskFailure` reaches the caller.

use std::time::Duration;

use thiserror::Error;

use crate::types::Strategy;

/// Failure reported by a [`BrowserDriver`](crate::driver::BrowserDriver).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{operation} failed: {reason}")]
    Operation {
        operation: &'static str,
        reason: String,
    },
}

impl DriverError {
    pub fn operation(operation: &'static str, reason: impl ToString) -> Self {
        DriverError::Operation {
            operation,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("invalid selector strategy: {0}")]
    InvalidStrategy(String),

    #[error("empty selector value for strategy {0}")]
    EmptyValue(Strategy),

    #[error("element not found using {strategy}: {value} (waited {waited:?})")]
    ElementNotFound {
        strategy: Strategy,
        value: String,
        waited: Duration,
    },

    #[error("timeout waiting for element using {strategy}: {value} to become interactable")]
    Timeout {
        strategy: Strategy,
        value: String,
        waited: Duration,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("language model transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("language model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("empty response from language model")]
    EmptyResponse,

    #[error("malformed language model payload: {0}")]
    Malformed(String),
}

/// Why a candidate action mapping was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("action is not an object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid action type: {0}")]
    UnknownKind(String),

    #[error("target must be a string or a {{strategy, value}} object")]
    BadTarget,

    #[error("invalid selector strategy: {0}")]
    UnknownStrategy(String),

    #[error("locator value must be a non-empty string")]
    EmptyLocatorValue,

    #[error("type action missing value")]
    MissingTypeValue,
}

/// Why raw model text could not be turned into a batch of actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("no JSON found in model response")]
    NoJson,

    #[error("could not decode model response: {0}")]
    Undecodable(String),

    #[error("model returned an empty action list")]
    Empty,

    #[error("model response is neither an action nor a list of actions")]
    WrongShape,

    #[error("action #{index} is invalid: {violation}")]
    Invalid {
        index: usize,
        violation: SchemaViolation,
    },
}

/// A recoverable failure of one loop iteration.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invalid action format: {0}")]
    InvalidActionFormat(String),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    ModelService(#[from] ModelError),

    #[error("model response unusable: {0}")]
    Unparseable(ParseFailure),

    #[error("{kind} cannot target {target}")]
    UnsupportedTarget { kind: &'static str, target: String },

    #[error("invalid wait target: {0}")]
    BadWait(String),
}

/// Terminal failure of a task; the only error the caller sees.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("maximum retries exceeded ({retries} consecutive failures), last error: {last_error}")]
    MaxRetriesExceeded { retries: u32, last_error: String },

    #[error("invalid initial action: {0}")]
    InvalidInitialAction(String),

    #[error("step limit reached after {0} iterations")]
    StepLimitReached(usize),
}

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}
