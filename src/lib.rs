//! LLM-driven browser navigation.
//!
//! A [`navigator::Navigator`] asks a [`brain::LanguageModel`] what to do next,
//! validates the reply and drives a [`driver::BrowserDriver`] until the model
//! flags the task complete or too many consecutive iterations fail.

pub mod brain;
pub mod config;
pub mod dom;
pub mod driver;
pub mod error;
pub mod events;
pub mod hands;
pub mod history;
pub mod locator;
pub mod navigator;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod types;

pub use brain::{ChatClient, LanguageModel};
pub use config::Settings;
pub use driver::BrowserDriver;
pub use error::{StepError, TaskFailure};
pub use events::{EventSink, NavigatorEvent};
pub use hands::BrowserSession;
pub use navigator::{LoopState, Navigator, StepOutcome};
pub use types::{Action, HistoryEntry, TaskOutcome};
