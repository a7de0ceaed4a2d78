//! The navigation control loop.
//!
//! ```text
//! INITIALIZING -> RUNNING <-> RETRYING -> { SUCCEEDED, FAILED }
//! ```
//!
//! Each iteration produces a [`StepOutcome`]; [`Navigator::apply`] is the
//! transition table. Recoverable failures only bump the consecutive-failure
//! counter, and any clean iteration resets it. Only [`TaskFailure`] leaves
//! the loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::brain::LanguageModel;
use crate::config::NavigatorSettings;
use crate::driver::BrowserDriver;
use crate::error::{ParseFailure, SchemaViolation, StepError, TaskFailure};
use crate::events::{EventSink, NavigatorEvent, NoopSink};
use crate::history::ActionHistory;
use crate::locator::{LocatorResolver, Readiness};
use crate::parser;
use crate::prompt;
use crate::schema;
use crate::types::{
    ACTION_DONE, Action, ActionKind, HISTORY_WINDOW, HistoryEntry, InitialAction, MAX_WAIT_SECS,
    PageSnapshot, Target, TaskOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

/// Result of one initialization attempt or one loop iteration.
#[derive(Debug)]
pub enum StepOutcome {
    /// The batch ran cleanly without signalling completion.
    Continue,
    /// An action carried the completion flag; holds its result.
    Complete(String),
    Recoverable(StepError),
    Fatal(TaskFailure),
}

pub struct Navigator<D, M> {
    driver: D,
    model: M,
    settings: NavigatorSettings,
    resolver: LocatorResolver,
    history: ActionHistory,
    retries: u32,
    state: LoopState,
    sink: Arc<dyn EventSink>,
}

impl<D: BrowserDriver, M: LanguageModel> Navigator<D, M> {
    pub fn new(driver: D, model: M, settings: NavigatorSettings) -> Self {
        let resolver = LocatorResolver::new(settings.wait_timeout, settings.poll_interval);
        Self {
            driver,
            model,
            settings,
            resolver,
            history: ActionHistory::new(),
            retries: 0,
            state: LoopState::Initializing,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn into_history(self) -> ActionHistory {
        self.history
    }

    /// Consecutive failed iterations so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs one task to a terminal outcome. History starts empty and is
    /// kept afterwards for the caller to read.
    ///
    /// Besides [`TaskFailure::MaxRetriesExceeded`] and
    /// [`TaskFailure::InvalidInitialAction`], the task fails with
    /// [`TaskFailure::StepLimitReached`] once `max_steps` iterations have run,
    /// even if the model is still making progress. Set `max_steps` to `None`
    /// to run until completion or the failure threshold.
    pub fn run_task(&mut self, task: &str) -> TaskOutcome {
        self.history = ActionHistory::new();
        self.retries = 0;
        self.state = LoopState::Initializing;
        info!("Starting new task with prompt: {}", task);
        self.emit(NavigatorEvent::TaskStarted {
            task: task.to_string(),
        });

        while self.state != LoopState::Running {
            let outcome = self.initialize(task);
            if let Some(done) = self.apply(outcome) {
                return done;
            }
        }

        info!("Starting main action loop");
        let mut iterations = 0;
        loop {
            if self.settings.max_steps.is_some_and(|limit| iterations >= limit) {
                return self.fail(TaskFailure::StepLimitReached(iterations));
            }
            iterations += 1;
            self.emit(NavigatorEvent::Thinking {
                iteration: iterations,
            });

            let outcome = self.step(task);
            if let Some(done) = self.apply(outcome) {
                return done;
            }
        }
    }

    /// The transition table. Returns the terminal outcome once reached.
    pub fn apply(&mut self, outcome: StepOutcome) -> Option<TaskOutcome> {
        match outcome {
            StepOutcome::Continue => {
                self.retries = 0;
                self.state = LoopState::Running;
                None
            }
            StepOutcome::Complete(result) => {
                info!("Task completed successfully");
                self.state = LoopState::Succeeded;
                self.emit(NavigatorEvent::TaskComplete {
                    result: result.clone(),
                });
                Some(TaskOutcome::Succeeded { result })
            }
            StepOutcome::Recoverable(err) => {
                self.retries += 1;
                let message = err.to_string();
                warn!(
                    "Error during navigation ({}/{}): {}",
                    self.retries, self.settings.max_retries, message
                );
                self.emit(NavigatorEvent::StepFailed {
                    message: message.clone(),
                    retries: self.retries,
                });
                if self.retries >= self.settings.max_retries {
                    return Some(self.fail(TaskFailure::MaxRetriesExceeded {
                        retries: self.retries,
                        last_error: message,
                    }));
                }
                if self.state != LoopState::Initializing {
                    self.state = LoopState::Retrying;
                }
                None
            }
            StepOutcome::Fatal(failure) => Some(self.fail(failure)),
        }
    }

    fn fail(&mut self, failure: TaskFailure) -> TaskOutcome {
        error!("Task failed: {}", failure);
        self.state = LoopState::Failed;
        self.emit(NavigatorEvent::TaskFailed {
            message: failure.to_string(),
        });
        TaskOutcome::Failed(failure)
    }

    /// Asks the model where to start and goes there.
    pub fn initialize(&mut self, task: &str) -> StepOutcome {
        let prompt = prompt::initial_prompt(task);
        self.emit(NavigatorEvent::PromptSent {
            prompt: prompt.clone(),
        });
        let raw = match self.model.complete(&prompt) {
            Ok(raw) => raw,
            Err(e) => return StepOutcome::Recoverable(e.into()),
        };
        self.emit(NavigatorEvent::ModelReplied { raw: raw.clone() });

        let initial = match parser::parse_initial(&raw) {
            Ok(initial) => initial,
            Err(failure) => return StepOutcome::Fatal(failure),
        };
        info!("Initial action decided: {:?}", initial);

        let (url, query) = match initial {
            InitialAction::Navigate(url) => (normalize_url(&url), None),
            InitialAction::Search(query) => {
                let parsed = reqwest::Url::parse_with_params(
                    &self.settings.search_url,
                    [("q", query.as_str())],
                );
                match parsed {
                    Ok(url) => (url.to_string(), Some(query)),
                    Err(e) => {
                        return StepOutcome::Fatal(TaskFailure::InvalidInitialAction(format!(
                            "cannot search via {}: {e}",
                            self.settings.search_url
                        )));
                    }
                }
            }
        };

        if let Err(e) = self.driver.navigate(&url) {
            return StepOutcome::Recoverable(e.into());
        }

        let mut action = Action::navigate(url.clone());
        action.value = query;
        self.record(&action, url, None);
        StepOutcome::Continue
    }

    /// One RUNNING iteration: snapshot, ask, validate, execute.
    pub fn step(&mut self, task: &str) -> StepOutcome {
        match self.try_step(task) {
            Ok(Some(result)) => StepOutcome::Complete(result),
            Ok(None) => StepOutcome::Continue,
            Err(e) => StepOutcome::Recoverable(e),
        }
    }

    fn try_step(&mut self, task: &str) -> Result<Option<String>, StepError> {
        let snapshot = self.snapshot()?;
        info!("Current page: {} - {}", snapshot.url, snapshot.title);

        let prompt =
            prompt::next_action_prompt(task, &snapshot, self.history.last_n(HISTORY_WINDOW));
        debug!("Prompt:\n{}", prompt);
        self.emit(NavigatorEvent::PromptSent {
            prompt: prompt.clone(),
        });
        let raw = self.model.complete(&prompt)?;
        self.emit(NavigatorEvent::ModelReplied { raw: raw.clone() });

        let actions = match parser::try_parse(&raw) {
            Ok(actions) => actions,
            Err(failure @ ParseFailure::Invalid { .. }) => {
                return Err(StepError::InvalidActionFormat(failure.to_string()));
            }
            Err(failure) => {
                self.fall_back(&snapshot.url);
                return Err(StepError::Unparseable(failure));
            }
        };

        // the whole batch is checked before anything runs
        if let Some(violation) = actions.iter().find_map(|a| schema::check_action(a).err()) {
            return Err(StepError::InvalidActionFormat(violation.to_string()));
        }

        for action in &actions {
            info!("Next action decided: {}", action);
            if let Some(why) = &action.explanation {
                debug!("Model explanation: {}", why);
            }
            let result = self.execute(action)?;
            info!("Action performed successfully: {} on {}", action.kind, action.target);
            self.record(action, snapshot.url.clone(), result.clone());

            if action.completion_flag {
                info!("Task marked as complete by action");
                return Ok(Some(result.unwrap_or_else(|| ACTION_DONE.to_string())));
            }
        }
        Ok(None)
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, StepError> {
        Ok(PageSnapshot {
            url: self.driver.current_url()?,
            title: self.driver.current_title()?,
            elements: self.driver.list_elements()?,
        })
    }

    /// Runs the fallback action so an unusable reply still makes visible
    /// progress. The iteration is counted as failed either way.
    fn fall_back(&mut self, current_url: &str) {
        let action = parser::fallback_action(&self.settings.fallback_url);
        warn!("Unusable model response, falling back to {}", action.target);
        match self.execute(&action) {
            Ok(result) => self.record(&action, current_url.to_string(), result),
            Err(e) => warn!("Fallback action failed: {}", e),
        }
    }

    /// Executes one validated action. `Some(text)` only for extract.
    fn execute(&mut self, action: &Action) -> Result<Option<String>, StepError> {
        match action.kind {
            ActionKind::Navigate => {
                let url = match &action.target {
                    Target::Raw(url) => normalize_url(url),
                    Target::Locator(locator) => {
                        return Err(StepError::UnsupportedTarget {
                            kind: "navigate",
                            target: locator.to_string(),
                        });
                    }
                };
                self.driver.navigate(&url)?;
                Ok(None)
            }
            ActionKind::Click => {
                let element =
                    self.resolver
                        .resolve(&mut self.driver, &action.target, Readiness::Interactable)?;
                self.driver.click(&element)?;
                Ok(None)
            }
            ActionKind::Type => {
                let text = action.value.as_deref().ok_or_else(|| {
                    StepError::InvalidActionFormat(SchemaViolation::MissingTypeValue.to_string())
                })?;
                let element =
                    self.resolver
                        .resolve(&mut self.driver, &action.target, Readiness::Present)?;
                self.driver.type_into(&element, text)?;
                Ok(None)
            }
            ActionKind::Wait => {
                if let Target::Raw(raw) = &action.target {
                    if let Ok(secs) = raw.trim().parse::<f64>() {
                        if !secs.is_finite() || secs < 0.0 {
                            return Err(StepError::BadWait(raw.clone()));
                        }
                        info!("Waiting for {} seconds", secs);
                        thread::sleep(Duration::from_secs_f64(secs.min(MAX_WAIT_SECS)));
                        return Ok(None);
                    }
                }
                self.resolver
                    .resolve(&mut self.driver, &action.target, Readiness::Present)?;
                Ok(None)
            }
            ActionKind::Extract => {
                let element =
                    self.resolver
                        .resolve(&mut self.driver, &action.target, Readiness::Present)?;
                let text = self.driver.read_text(&element)?;
                Ok(Some(text))
            }
        }
    }

    fn record(&mut self, action: &Action, url: String, result: Option<String>) {
        self.history.append(HistoryEntry {
            kind: action.kind,
            target: action.target.clone(),
            value: action.value.clone(),
            url,
            result: result.clone(),
        });
        self.emit(NavigatorEvent::ActionExecuted {
            number: self.history.len(),
            action: action.clone(),
            result,
        });
    }

    fn emit(&self, event: NavigatorEvent) {
        self.sink.emit(&event);
    }
}

/// Adds `https://` to bare hosts such as `example.com`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_get_a_scheme() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" https://example.com "), "https://example.com");
        assert_eq!(normalize_url("about:blank"), "about:blank");
        assert_eq!(normalize_url("http://localhost:8000"), "http://localhost:8000");
    }
}
