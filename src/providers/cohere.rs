//! Cohere chat wire format.

use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use super::http::header_map;
use super::openai::count;
use super::profile::ProviderProfile;
use crate::Result;
use crate::types::{ChatRequest, Role, Usage};

#[derive(Debug, Serialize)]
pub(crate) struct CohereChatRequest {
    pub model: String,
    pub messages: Vec<CohereMessage>,
    pub temperature: f64,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CohereMessage {
    pub role: &'static str,
    pub content: String,
}

pub(crate) fn endpoint(profile: &ProviderProfile) -> String {
    format!("{}/v1/chat", profile.base_url)
}

pub(crate) fn headers(profile: &ProviderProfile) -> Result<HeaderMap> {
    let bearer = format!("Bearer {}", profile.api_key);
    header_map(
        std::iter::once(("Authorization", bearer.as_str())).chain(
            profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        ),
    )
}

fn upper_role(role: Role) -> &'static str {
    match role {
        Role::System => "SYSTEM",
        Role::User => "USER",
        Role::Assistant => "ASSISTANT",
        Role::Tool => "TOOL",
    }
}

/// Upper-case roles and flatten multi-part content into plain text.
pub(crate) fn translate(request: &ChatRequest, stream: bool) -> CohereChatRequest {
    CohereChatRequest {
        model: request.model.clone(),
        messages: request
            .messages
            .iter()
            .map(|m| CohereMessage {
                role: upper_role(m.role),
                content: m.text(),
            })
            .collect(),
        temperature: request.temperature,
        stream,
        max_tokens: request.max_tokens,
    }
}

/// Cohere reports usage under `usage.tokens`, falling back to `usage.billed_units`.
pub(crate) fn parse_usage(body: &Value) -> Usage {
    let usage = &body["usage"];
    for section in ["tokens", "billed_units"] {
        let counts = &usage[section];
        let parsed = Usage::new(
            count(&counts["input_tokens"]),
            count(&counts["output_tokens"]),
        );
        if !parsed.is_unknown() {
            return parsed;
        }
    }
    Usage::default()
}

/// `message.content[*].text`, or the legacy top-level `text`.
pub(crate) fn extract_completion(body: &Value) -> Option<String> {
    if let Some(blocks) = body["message"]["content"].as_array() {
        return Some(
            blocks
                .iter()
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
        );
    }
    body["text"].as_str().map(str::to_string)
}
