//! Normalized chat-completion request

use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use crate::{GatewayError, Result};

fn default_temperature() -> f64 {
    1.0
}

fn default_top_p() -> f64 {
    1.0
}

/// A chat-completion request in the gateway's normalized (OpenAI-shaped) form.
///
/// Serializing this struct yields the OpenAI wire payload, minus the
/// `stream` flag which adapters set per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    /// Caller identity, used as the rate-limit key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            stream: false,
            user: None,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Check the field constraints a front-end schema would enforce.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::Validation("model is required".into()));
        }
        if self.messages.is_empty() {
            return Err(GatewayError::Validation(
                "at least one message is required".into(),
            ));
        }
        if let Some(idx) = self.messages.iter().position(|m| m.content.is_blank()) {
            return Err(GatewayError::Validation(format!(
                "message {idx} has empty content"
            )));
        }
        if !self.messages.iter().any(|m| m.role == Role::User) {
            return Err(GatewayError::Validation(
                "at least one user message is required".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GatewayError::Validation(
                "temperature must be within [0, 2]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(GatewayError::Validation(
                "top_p must be within [0, 1]".into(),
            ));
        }
        if self.max_tokens == Some(0) {
            return Err(GatewayError::Validation(
                "max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Cache key text: one `role:content` line per message, content trimmed.
    pub fn cache_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}:{}", m.role.as_str(), m.text().trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain prompt text used for token estimation.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(Message::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
