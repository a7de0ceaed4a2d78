//! Progress events emitted by the navigator at well-defined points.
//!
//! Sinks are injected; the navigator never writes debug files or streams on
//! its own.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::types::Action;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NavigatorEvent {
    TaskStarted { task: String },
    Thinking { iteration: usize },
    PromptSent { prompt: String },
    ModelReplied { raw: String },
    ActionExecuted {
        number: usize,
        action: Action,
        result: Option<String>,
    },
    StepFailed { message: String, retries: u32 },
    TaskComplete { result: String },
    TaskFailed { message: String },
}

impl NavigatorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NavigatorEvent::TaskStarted { .. } => "task_started",
            NavigatorEvent::Thinking { .. } => "thinking",
            NavigatorEvent::PromptSent { .. } => "prompt_sent",
            NavigatorEvent::ModelReplied { .. } => "model_replied",
            NavigatorEvent::ActionExecuted { .. } => "action_executed",
            NavigatorEvent::StepFailed { .. } => "step_failed",
            NavigatorEvent::TaskComplete { .. } => "task_complete",
            NavigatorEvent::TaskFailed { .. } => "task_failed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &NavigatorEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &NavigatorEvent) {}
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &NavigatorEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Appends one JSON object per event to a file, for offline debugging of
/// prompts and raw model replies.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &NavigatorEvent) {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let line = json!({ "ts_ms": ts_ms, "payload": event });

        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        let written = serde_json::to_writer(&mut *writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            warn!("Failed to write debug event: {}", e);
        }
    }
}
