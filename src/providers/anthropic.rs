//! Anthropic messages wire format.

use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use super::http::header_map;
use super::openai::count;
use super::profile::ProviderProfile;
use crate::Result;
use crate::types::{ChatRequest, Role, Usage};

/// System prompt used when the conversation does not open with one.
pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a climate-aware AI assistant.";

const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    pub role: &'static str,
    pub content: Vec<TextBlock>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TextBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

pub(crate) fn endpoint(profile: &ProviderProfile) -> String {
    format!("{}/messages", profile.base_url)
}

pub(crate) fn headers(profile: &ProviderProfile) -> Result<HeaderMap> {
    header_map(
        std::iter::once(("x-api-key", profile.api_key.as_str())).chain(
            profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        ),
    )
}

/// Lift a leading system message into `system`; everything that is not an
/// assistant turn is sent as a user turn.
pub(crate) fn translate(request: &ChatRequest, stream: bool) -> MessagesRequest {
    let (system, rest) = match request.messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (first.text(), rest),
        _ => (DEFAULT_SYSTEM_PROMPT.to_string(), request.messages.as_slice()),
    };

    let messages = rest
        .iter()
        .map(|m| AnthropicMessage {
            role: if m.role == Role::Assistant {
                "assistant"
            } else {
                "user"
            },
            content: vec![TextBlock {
                kind: "text",
                text: m.text(),
            }],
        })
        .collect();

    MessagesRequest {
        model: request.model.clone(),
        system,
        messages,
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: request.temperature,
        top_p: request.top_p,
        stream,
    }
}

/// `usage.input_tokens` / `usage.output_tokens`
pub(crate) fn parse_usage(body: &Value) -> Usage {
    let usage = &body["usage"];
    Usage::new(
        count(&usage["input_tokens"]),
        count(&usage["output_tokens"]),
    )
}

/// Concatenated text blocks of `content`.
pub(crate) fn extract_completion(body: &Value) -> Option<String> {
    let blocks = body["content"].as_array()?;
    Some(
        blocks
            .iter()
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
    )
}
