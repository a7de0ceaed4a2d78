use std::collections::VecDeque;
use std::str::FromStr;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ModelSettings;
use crate::error::ModelError;
use crate::prompt::SYSTEM_PROMPT;

/// Prior user/assistant messages kept for context within one task.
pub const MAX_CONVERSATION_MESSAGES: usize = 10;

/// String in, string out. Transport, auth and model choice stay behind
/// this trait.
pub trait LanguageModel {
    fn complete(&mut self, prompt: &str) -> Result<String, ModelError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &mut M {
    fn complete(&mut self, prompt: &str) -> Result<String, ModelError> {
        (**self).complete(prompt)
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn complete(&mut self, prompt: &str) -> Result<String, ModelError> {
        (**self).complete(prompt)
    }
}

/// Wire dialect of the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatBackend {
    /// `POST /api/chat`, reply in `message.content`.
    Ollama,
    /// `POST /v1/chat/completions`, reply in `choices[0].message.content`.
    OpenAi,
}

impl ChatBackend {
    pub fn infer(api_url: &str) -> Self {
        if api_url.trim_end_matches('/').ends_with("/chat/completions") {
            ChatBackend::OpenAi
        } else {
            ChatBackend::Ollama
        }
    }
}

impl FromStr for ChatBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(ChatBackend::Ollama),
            "openai" => Ok(ChatBackend::OpenAi),
            other => Err(format!("unknown backend `{other}`, expected ollama or openai")),
        }
    }
}

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Blocking HTTP chat client. Must be created and dropped outside an async
/// context (the binary runs it on the blocking pool).
pub struct ChatClient {
    client: Client,
    settings: ModelSettings,
    conversation: VecDeque<ChatMessage>,
}

impl ChatClient {
    pub fn new(settings: ModelSettings) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        debug!(
            "Chat client ready: {} via {:?} at {}",
            settings.model, settings.backend, settings.api_url
        );
        Ok(Self {
            client,
            settings,
            conversation: VecDeque::new(),
        })
    }

    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.conversation.iter()
    }

    fn remember(&mut self, prompt: &str, reply: &str) {
        self.conversation.push_back(ChatMessage::new("user", prompt));
        self.conversation.push_back(ChatMessage::new("assistant", reply));
        while self.conversation.len() > MAX_CONVERSATION_MESSAGES {
            self.conversation.pop_front();
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut messages = Vec::with_capacity(self.conversation.len() + 2);
        messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
        messages.extend(self.conversation.iter().cloned());
        messages.push(ChatMessage::new("user", prompt));

        match self.settings.backend {
            ChatBackend::Ollama => json!({
                "model": self.settings.model,
                "messages": messages,
                "stream": false,
            }),
            ChatBackend::OpenAi => json!({
                "model": self.settings.model,
                "messages": messages,
                "temperature": 0.2,
            }),
        }
    }
}

impl LanguageModel for ChatClient {
    fn complete(&mut self, prompt: &str) -> Result<String, ModelError> {
        let mut request = self
            .client
            .post(&self.settings.api_url)
            .json(&self.request_body(prompt));
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|payload| error_message(&payload))
                .unwrap_or(body);
            warn!("[Brain] API error ({}): {}", status, message);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value =
            serde_json::from_str(&body).map_err(|e| ModelError::Malformed(e.to_string()))?;
        let content = match self.settings.backend {
            ChatBackend::Ollama => &payload["message"]["content"],
            ChatBackend::OpenAi => &payload["choices"][0]["message"]["content"],
        };
        let content = content.as_str().map(str::trim).unwrap_or_default();
        if content.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        debug!("[Brain] LLM says: {}", content);
        let content = content.to_string();
        self.remember(prompt, &content);
        Ok(content)
    }
}

fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_inferred_from_url() {
        assert_eq!(
            ChatBackend::infer("https://api.openai.com/v1/chat/completions"),
            ChatBackend::OpenAi
        );
        assert_eq!(
            ChatBackend::infer("http://localhost:11434/api/chat"),
            ChatBackend::Ollama
        );
        assert_eq!("OpenAI".parse::<ChatBackend>(), Ok(ChatBackend::OpenAi));
    }

    #[test]
    fn error_message_handles_both_shapes() {
        let nested = json!({"error": {"message": "Invalid API key"}});
        let flat = json!({"error": "model not found"});
        assert_eq!(error_message(&nested).as_deref(), Some("Invalid API key"));
        assert_eq!(error_message(&flat).as_deref(), Some("model not found"));
        assert_eq!(error_message(&json!({})), None);
    }
}
