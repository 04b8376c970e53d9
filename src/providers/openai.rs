//! OpenAI chat-completions wire format.
//!
//! The normalized request already is the OpenAI shape, so translation only
//! injects the per-call `stream` flag.

use reqwest::header::HeaderMap;
use serde_json::Value;

use super::http::header_map;
use super::profile::ProviderProfile;
use crate::Result;
use crate::types::{ChatRequest, Usage};

pub(crate) fn endpoint(profile: &ProviderProfile) -> String {
    format!("{}/chat/completions", profile.base_url)
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

/// The request as sent upstream, with the stream flag for this call.
pub(crate) fn translate(request: &ChatRequest, stream: bool) -> ChatRequest {
    let mut payload = request.clone();
    payload.stream = stream;
    payload
}

/// Read `usage.prompt_tokens` / `usage.completion_tokens`.
///
/// Shared with Azure, which answers in the same shape.
pub(crate) fn parse_usage(body: &Value) -> Usage {
    let usage = &body["usage"];
    Usage::new(
        count(&usage["prompt_tokens"]),
        count(&usage["completion_tokens"]),
    )
}

/// `choices[0].message.content`
pub(crate) fn extract_completion(body: &Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

/// Token count from a JSON number; anything else counts as zero.
pub(crate) fn count(value: &Value) -> u32 {
    value
        .as_u64()
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}
