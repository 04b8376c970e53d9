//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (explicit)
//! 2. `~/.greengate/config.toml` (user)
//! 3. `/etc/greengate/config.toml` (system)
//!
//! When no file exists and no explicit path was given, built-in defaults are
//! used, so a gateway can run from environment variables alone.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.greengate/secrets.toml` (user, must be 0600)
//! 2. `/etc/greengate/secrets.toml` (system, must be 0600)
//!
//! Credentials the file leaves unset are filled from environment variables
//! at load time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::energy::LedgerConfig;
use crate::providers::{ProviderKind, ProviderProfile, RetryConfig, RouterConfig};
use crate::{GatewayError, Result};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Identity and switches for this gateway instance.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Emit request-level metrics (default: true).
    #[serde(default = "default_true")]
    pub telemetry_enabled: bool,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            environment: default_environment(),
            telemetry_enabled: true,
        }
    }
}

fn default_project_name() -> String {
    "GreenGate".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

/// Admission and upstream limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Requests per minute per caller identity (default: 120).
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Upstream HTTP timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub http_timeout_secs: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate_limit(),
            http_timeout_secs: default_timeout(),
        }
    }
}

impl LimitsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_secs)
    }
}

fn default_rate_limit() -> u32 {
    120
}

fn default_timeout() -> f64 {
    60.0
}

/// Per-provider overrides. Absent sections use built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<ProviderOverrides>,
    #[serde(default)]
    pub anthropic: Option<ProviderOverrides>,
    #[serde(default)]
    pub cohere: Option<ProviderOverrides>,
    #[serde(default)]
    pub azure_openai: Option<ProviderOverrides>,
}

impl ProvidersConfig {
    fn overrides(&self, kind: ProviderKind) -> Option<&ProviderOverrides> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::Cohere => self.cohere.as_ref(),
            ProviderKind::AzureOpenAi => self.azure_openai.as_ref(),
        }
    }
}

/// Optional overrides for one provider's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverrides {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub supported_models: Option<Vec<String>>,
    #[serde(default)]
    pub energy_modifier: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub cost_per_1k_tokens: Option<f64>,
    #[serde(default)]
    pub reliability: Option<f64>,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Azure only: logical model → deployment name.
    #[serde(default)]
    pub deployments: Option<DeploymentMap>,
    /// Azure only.
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Azure deployment aliases, as a TOML table or a `model=deployment,...` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeploymentMap {
    Table(BTreeMap<String, String>),
    Pairs(String),
}

impl DeploymentMap {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            DeploymentMap::Table(map) => map.clone(),
            DeploymentMap::Pairs(pairs) => parse_pairs(pairs),
        }
    }
}

/// Parse comma-delimited `key=value` pairs, skipping malformed entries.
pub fn parse_pairs(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            if value.contains('=') {
                return None;
            }
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.greengate/config.toml`
    /// 3. `/etc/greengate/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            GatewayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content)
            .map_err(|e| GatewayError::Configuration(format!("{path:?}: {e}")))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            GatewayError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(GatewayError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".greengate").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/greengate/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(GatewayError::Configuration(msg.to_string()));
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return invalid("cache.similarity_threshold must be within [0, 1]");
        }
        if self.cache.top_k == 0 || self.cache.max_results == 0 {
            return invalid("cache.top_k and cache.max_results must be at least 1");
        }
        if self.limits.rate_limit_per_minute == 0 {
            return invalid("limits.rate_limit_per_minute must be at least 1");
        }
        if !(self.limits.http_timeout_secs > 0.0) {
            return invalid("limits.http_timeout_secs must be positive");
        }
        if !(self.retry.backoff_secs > 0.0) {
            return invalid("retry.backoff_secs must be positive");
        }
        Ok(())
    }

    /// Provider profile for every provider whose credentials are available.
    ///
    /// Order follows [`ProviderKind::ALL`]; the dispatcher applies the
    /// configured preference sequence on top.
    pub fn provider_profiles(&self, secrets: &Secrets) -> Vec<ProviderProfile> {
        ProviderKind::ALL
            .iter()
            .filter_map(|&kind| self.profile_for(kind, secrets))
            .collect()
    }

    fn profile_for(&self, kind: ProviderKind, secrets: &Secrets) -> Option<ProviderProfile> {
        let api_key = secrets.api_key(kind.config_key())?;
        let mut profile = kind.default_profile();
        profile.api_key = api_key;

        let overrides = self.providers.overrides(kind);
        if let Some(o) = overrides {
            if let Some(ref url) = o.base_url {
                profile.base_url = url.clone();
            }
            if let Some(v) = o.energy_modifier {
                profile.energy_modifier = v;
            }
            if let Some(v) = o.latency_ms {
                profile.latency_ms = v;
            }
            if let Some(v) = o.cost_per_1k_tokens {
                profile.cost_per_1k_tokens = v;
            }
            if let Some(v) = o.reliability {
                profile.reliability = v;
            }
            profile.extra_headers.extend(o.extra_headers.clone());
            if let Some(ref deployments) = o.deployments {
                profile.deployments = deployments.to_map();
            }
            if let Some(ref version) = o.api_version {
                profile.api_version = Some(version.clone());
            }
        }

        if kind == ProviderKind::AzureOpenAi {
            // Azure has no public default endpoint.
            if overrides.and_then(|o| o.base_url.as_ref()).is_none() {
                profile.base_url = secrets.azure_endpoint()?;
            }
            profile.supported_models = profile.deployments.keys().cloned().collect();
        }
        if let Some(models) = overrides.and_then(|o| o.supported_models.clone()) {
            profile.supported_models = models;
        }

        profile.base_url = profile.base_url.trim_end_matches('/').to_string();
        Some(profile)
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
    #[serde(default)]
    pub cohere: Option<ApiKeySecret>,
    #[serde(default)]
    pub azure_openai: Option<AzureSecret>,
    /// Shared key clients must present to the gateway.
    #[serde(default)]
    pub gateway: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Azure needs its resource endpoint alongside the key.
#[derive(Debug, Clone, Deserialize)]
pub struct AzureSecret {
    pub api_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

const OPENAI_ENV_VAR: &str = "OPENAI_API_KEY";
const ANTHROPIC_ENV_VAR: &str = "ANTHROPIC_API_KEY";
const COHERE_ENV_VAR: &str = "COHERE_API_KEY";
const AZURE_KEY_ENV_VAR: &str = "AZURE_OPENAI_API_KEY";
const AZURE_ENDPOINT_ENV_VAR: &str = "AZURE_OPENAI_ENDPOINT";
const GATEWAY_KEY_ENV_VAR: &str = "GATEWAY_API_KEY";

const SECRETS_FILE: &str = "secrets.toml";

impl Secrets {
    /// Load provider credentials.
    ///
    /// The first secrets file found is read:
    /// 1. `~/.greengate/secrets.toml`
    /// 2. `/etc/greengate/secrets.toml`
    ///
    /// The file must not be readable by group or others. Anything the file
    /// leaves unset is then taken from the environment
    /// (`OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`, ...).
    pub fn load() -> Result<Self> {
        let from_file = match Self::locate() {
            Some(path) => Self::read_protected(&path)?,
            None => Secrets::default(),
        };
        Ok(from_file.fill_missing(|var| std::env::var(var).ok()))
    }

    fn locate() -> Option<PathBuf> {
        let user = dirs::home_dir().map(|home| home.join(".greengate").join(SECRETS_FILE));
        let system = Path::new("/etc/greengate").join(SECRETS_FILE);
        user.into_iter().chain([system]).find(|path| path.exists())
    }

    fn read_protected(path: &Path) -> Result<Self> {
        ensure_private(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("cannot read secrets {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            GatewayError::Configuration(format!("invalid secrets {path:?}: {e}"))
        })
    }

    /// Fill every credential the file left unset from `lookup`, which maps an
    /// environment variable name to its value. Empty values count as unset.
    pub fn fill_missing<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.is_empty());
        let key = |var: &str| lookup(var).map(|api_key| ApiKeySecret { api_key });

        self.openai = self.openai.or_else(|| key(OPENAI_ENV_VAR));
        self.anthropic = self.anthropic.or_else(|| key(ANTHROPIC_ENV_VAR));
        self.cohere = self.cohere.or_else(|| key(COHERE_ENV_VAR));
        self.gateway = self.gateway.or_else(|| key(GATEWAY_KEY_ENV_VAR));

        match self.azure_openai {
            Some(ref mut azure) => {
                if azure.endpoint.as_deref().is_none_or(str::is_empty) {
                    azure.endpoint = lookup(AZURE_ENDPOINT_ENV_VAR);
                }
            }
            None => {
                self.azure_openai = lookup(AZURE_KEY_ENV_VAR).map(|api_key| AzureSecret {
                    api_key,
                    endpoint: lookup(AZURE_ENDPOINT_ENV_VAR),
                });
            }
        }
        self
    }

    /// API key stored under a provider's config key (`openai`, `azure_openai`, ...).
    pub fn api_key(&self, name: &str) -> Option<String> {
        let key = match name {
            "openai" => self.openai.as_ref().map(|s| &s.api_key),
            "anthropic" => self.anthropic.as_ref().map(|s| &s.api_key),
            "cohere" => self.cohere.as_ref().map(|s| &s.api_key),
            "azure_openai" => self.azure_openai.as_ref().map(|s| &s.api_key),
            "gateway" => self.gateway.as_ref().map(|s| &s.api_key),
            _ => None,
        };
        key.filter(|k| !k.is_empty()).cloned()
    }

    /// Azure resource endpoint.
    pub fn azure_endpoint(&self) -> Option<String> {
        self.azure_openai
            .as_ref()
            .and_then(|s| s.endpoint.clone())
            .filter(|e| !e.is_empty())
    }

    /// The shared gateway key, if client authentication is enabled.
    pub fn gateway_key(&self) -> Option<String> {
        self.api_key("gateway")
    }
}

/// Reject secrets files that group or others can read.
#[cfg(unix)]
fn ensure_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)
        .map_err(|e| GatewayError::Configuration(format!("cannot stat secrets {path:?}: {e}")))?
        .permissions()
        .mode();
    if mode & 0o077 != 0 {
        return Err(GatewayError::Configuration(format!(
            "secrets {path:?} are mode {:o}; restrict them to the owner (chmod 600)",
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_private(_path: &Path) -> Result<()> {
    Ok(())
}
