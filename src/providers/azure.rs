//! Azure OpenAI wire format.
//!
//! Same payload as OpenAI, but addressed per deployment and authenticated
//! with an `api-key` header.

use reqwest::header::HeaderMap;

use super::http::header_map;
use super::profile::{DEFAULT_AZURE_API_VERSION, ProviderProfile};
use crate::types::ChatRequest;
use crate::{GatewayError, Result};

pub(crate) use super::openai::{extract_completion, parse_usage, translate};

/// Resolve the deployment for `model` and build its URL.
pub(crate) fn endpoint(profile: &ProviderProfile, request: &ChatRequest) -> Result<String> {
    if request.model.trim().is_empty() {
        return Err(GatewayError::Configuration(
            "Azure OpenAI provider requires a model name".into(),
        ));
    }
    let deployment = profile
        .deployments
        .get(&request.model)
        .unwrap_or(&request.model);
    let api_version = profile
        .api_version
        .as_deref()
        .unwrap_or(DEFAULT_AZURE_API_VERSION);
    Ok(format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
        profile.base_url
    ))
}

pub(crate) fn headers(profile: &ProviderProfile) -> Result<HeaderMap> {
    header_map(
        std::iter::once(("api-key", profile.api_key.as_str())).chain(
            profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        ),
    )
}
