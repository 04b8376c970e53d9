//! Provider kinds and their immutable profiles.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream wire protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "cohere")]
    Cohere,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
}

impl ProviderKind {
    /// Every supported kind, in default registration order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Cohere,
        ProviderKind::AzureOpenAi,
    ];

    /// Kind identifier, also the config and secrets section name.
    pub fn config_key(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Cohere => "cohere",
            ProviderKind::AzureOpenAi => "azure_openai",
        }
    }

    /// Provider name used for routing, headers, and the ledger.
    pub fn default_name(&self) -> &'static str {
        match self {
            ProviderKind::AzureOpenAi => "azure-openai",
            other => other.config_key(),
        }
    }

    /// Built-in profile for this kind, without credentials.
    pub fn default_profile(&self) -> ProviderProfile {
        let mut profile = ProviderProfile::new(*self, "");
        match self {
            ProviderKind::OpenAi => {
                profile.base_url = "https://api.openai.com/v1".into();
                profile.supported_models = models(&[
                    "gpt-4",
                    "gpt-4o",
                    "gpt-4o-mini",
                    "gpt-4.1",
                    "gpt-3.5-turbo",
                    "o3-mini",
                ]);
                profile.energy_modifier = 1.0;
                profile.latency_ms = 650.0;
                profile.cost_per_1k_tokens = 30.0;
                profile.reliability = 0.995;
            }
            ProviderKind::Anthropic => {
                profile.base_url = "https://api.anthropic.com/v1".into();
                profile.supported_models = models(&[
                    "claude-3-opus",
                    "claude-3-sonnet",
                    "claude-3-haiku",
                    "claude-2.1",
                ]);
                profile.energy_modifier = 0.85;
                profile.latency_ms = 720.0;
                profile.cost_per_1k_tokens = 24.0;
                profile.reliability = 0.985;
                profile
                    .extra_headers
                    .insert("anthropic-version".into(), "2023-06-01".into());
            }
            ProviderKind::Cohere => {
                profile.base_url = "https://api.cohere.ai".into();
                profile.supported_models =
                    models(&["command-r", "command-r-plus", "command-light", "command"]);
                profile.energy_modifier = 0.9;
                profile.latency_ms = 680.0;
                profile.cost_per_1k_tokens = 18.0;
                profile.reliability = 0.98;
                profile
                    .extra_headers
                    .insert("Cohere-Version".into(), "2024-10-22".into());
            }
            ProviderKind::AzureOpenAi => {
                profile.energy_modifier = 1.05;
                profile.latency_ms = 550.0;
                profile.cost_per_1k_tokens = 28.0;
                profile.reliability = 0.995;
                profile.api_version = Some(DEFAULT_AZURE_API_VERSION.into());
            }
        }
        profile
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

pub(crate) const DEFAULT_AZURE_API_VERSION: &str = "2024-07-01-preview";

fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Everything the router and adapters need to know about one upstream.
///
/// Built once from configuration and shared read-only afterwards.
#[derive(Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub kind: ProviderKind,
    pub api_key: String,
    /// Base endpoint without a trailing slash.
    pub base_url: String,
    /// Models this provider serves. Empty means any model.
    pub supported_models: Vec<String>,
    pub energy_modifier: f64,
    pub latency_ms: f64,
    pub cost_per_1k_tokens: f64,
    /// Observed success ratio in `[0, 1]`.
    pub reliability: f64,
    pub extra_headers: BTreeMap<String, String>,
    /// Azure: logical model → deployment name.
    pub deployments: BTreeMap<String, String>,
    /// Azure: `api-version` query parameter.
    pub api_version: Option<String>,
}

impl ProviderProfile {
    /// A profile with generic scoring attributes.
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            api_key: String::new(),
            base_url: base_url.into(),
            supported_models: Vec::new(),
            energy_modifier: 1.0,
            latency_ms: 800.0,
            cost_per_1k_tokens: 15.0,
            reliability: 0.98,
            extra_headers: BTreeMap::new(),
            deployments: BTreeMap::new(),
            api_version: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn energy_modifier(mut self, modifier: f64) -> Self {
        self.energy_modifier = modifier;
        self
    }

    pub fn latency_ms(mut self, latency: f64) -> Self {
        self.latency_ms = latency;
        self
    }

    pub fn cost_per_1k_tokens(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }

    pub fn reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn deployment(mut self, model: impl Into<String>, deployment: impl Into<String>) -> Self {
        self.deployments.insert(model.into(), deployment.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Whether this provider serves `model`.
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.is_empty() || self.supported_models.iter().any(|m| m == model)
    }
}

impl fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("supported_models", &self.supported_models)
            .field("energy_modifier", &self.energy_modifier)
            .field("latency_ms", &self.latency_ms)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .field("reliability", &self.reliability)
            .finish_non_exhaustive()
    }
}
