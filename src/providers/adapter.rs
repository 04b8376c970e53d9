//! Provider adapters: one wire protocol per [`ProviderKind`].

use std::sync::Arc;

use reqwest::Client;
use tracing::debug;

use super::profile::{ProviderKind, ProviderProfile};
use super::{anthropic, azure, cohere, http, openai};
use crate::Result;
use crate::types::{ChatRequest, ProviderResult, Usage};

/// A provider profile bound to an HTTP client.
///
/// Translation is selected by the profile's [`ProviderKind`], so the set of
/// wire formats is closed.
#[derive(Debug, Clone)]
pub struct ProviderAdapter {
    profile: Arc<ProviderProfile>,
    client: Client,
}

impl ProviderAdapter {
    pub fn new(profile: ProviderProfile, client: Client) -> Self {
        Self {
            profile: Arc::new(profile),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.profile.kind
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.profile.supports_model(model)
    }

    /// Send one request upstream.
    ///
    /// A unary call returns the parsed body with normalized usage; a streamed
    /// call returns as soon as the upstream accepts the request, with the
    /// body exposed as a chunk stream.
    pub async fn invoke(&self, request: &ChatRequest, stream: bool) -> Result<ProviderResult> {
        let profile = self.profile.as_ref();
        debug!(provider = %profile.name, kind = %profile.kind, stream, "invoking provider");

        let response = match profile.kind {
            ProviderKind::OpenAi => {
                let payload = openai::translate(request, stream);
                http::post_json(
                    &self.client,
                    &openai::endpoint(profile),
                    openai::headers(profile)?,
                    &payload,
                )
                .await?
            }
            ProviderKind::Anthropic => {
                let payload = anthropic::translate(request, stream);
                http::post_json(
                    &self.client,
                    &anthropic::endpoint(profile),
                    anthropic::headers(profile)?,
                    &payload,
                )
                .await?
            }
            ProviderKind::Cohere => {
                let payload = cohere::translate(request, stream);
                http::post_json(
                    &self.client,
                    &cohere::endpoint(profile),
                    cohere::headers(profile)?,
                    &payload,
                )
                .await?
            }
            ProviderKind::AzureOpenAi => {
                let url = azure::endpoint(profile, request)?;
                let payload = azure::translate(request, stream);
                http::post_json(&self.client, &url, azure::headers(profile)?, &payload).await?
            }
        };

        if stream {
            return Ok(ProviderResult {
                provider_name: profile.name.clone(),
                response: None,
                usage: Usage::default(),
                completion: None,
                energy_modifier: profile.energy_modifier,
                stream: Some(http::byte_stream(response)),
            });
        }

        let body = http::read_json(response).await?;
        let (usage, completion) = match profile.kind {
            ProviderKind::OpenAi => (openai::parse_usage(&body), openai::extract_completion(&body)),
            ProviderKind::Anthropic => (
                anthropic::parse_usage(&body),
                anthropic::extract_completion(&body),
            ),
            ProviderKind::Cohere => (cohere::parse_usage(&body), cohere::extract_completion(&body)),
            ProviderKind::AzureOpenAi => {
                (azure::parse_usage(&body), azure::extract_completion(&body))
            }
        };

        Ok(ProviderResult {
            provider_name: profile.name.clone(),
            response: Some(body),
            usage,
            completion,
            energy_modifier: profile.energy_modifier,
            stream: None,
        })
    }
}

impl AsRef<ProviderProfile> for ProviderAdapter {
    fn as_ref(&self) -> &ProviderProfile {
        &self.profile
    }
}
