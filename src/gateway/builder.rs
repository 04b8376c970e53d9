//! Builder for configuring gateway instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::pipeline::Gateway;
use crate::cache::{CacheConfig, InMemoryVectorStore, SemanticCache, VectorStore};
use crate::config::{Config, Secrets};
use crate::energy::{EnergyLedger, EnergyMeter, LedgerConfig};
use crate::providers::{Dispatcher, ProviderProfile, RetryConfig, RouterConfig};
use crate::rate_limit::RateLimiter;
use crate::{GatewayError, Result};

/// Main entry point for creating gateway instances.
pub struct GreenGate;

impl GreenGate {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct GatewayBuilder {
    project_name: String,
    environment: String,
    telemetry_enabled: bool,
    gateway_key: Option<String>,
    profiles: Vec<ProviderProfile>,
    router: RouterConfig,
    retry: RetryConfig,
    timeout: Duration,
    rate_limit_per_minute: u32,
    cache: CacheConfig,
    vector_store: Option<Arc<dyn VectorStore>>,
    ledger_path: PathBuf,
    meter: Option<EnergyMeter>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            project_name: config.gateway.project_name,
            environment: config.gateway.environment,
            telemetry_enabled: config.gateway.telemetry_enabled,
            gateway_key: None,
            profiles: Vec::new(),
            router: config.router,
            retry: config.retry,
            timeout: config.limits.http_timeout(),
            rate_limit_per_minute: config.limits.rate_limit_per_minute,
            cache: config.cache,
            vector_store: None,
            ledger_path: config.ledger.path,
            meter: None,
        }
    }

    /// Start from a loaded configuration; providers are registered for
    /// every credential found in `secrets`.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        Self {
            project_name: config.gateway.project_name.clone(),
            environment: config.gateway.environment.clone(),
            telemetry_enabled: config.gateway.telemetry_enabled,
            gateway_key: secrets.gateway_key(),
            profiles: config.provider_profiles(secrets),
            router: config.router.clone(),
            retry: config.retry.clone(),
            timeout: config.limits.http_timeout(),
            rate_limit_per_minute: config.limits.rate_limit_per_minute,
            cache: config.cache.clone(),
            vector_store: None,
            ledger_path: config.ledger.path.clone(),
            meter: None,
        }
    }

    /// Name and environment reported by [`Gateway::status()`].
    pub fn project(mut self, name: impl Into<String>, environment: impl Into<String>) -> Self {
        self.project_name = name.into();
        self.environment = environment.into();
        self
    }

    /// Enable or disable request-level metrics.
    pub fn telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    /// Require clients to present this key.
    pub fn gateway_key(mut self, key: impl Into<String>) -> Self {
        self.gateway_key = Some(key.into());
        self
    }

    /// Register an upstream provider.
    pub fn provider(mut self, profile: ProviderProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Scoring weights and provider preference order.
    pub fn router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upstream HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Use a custom similarity backend instead of the in-memory store.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = path.into();
        self
    }

    /// Use a pre-populated energy meter.
    pub fn energy_meter(mut self, meter: EnergyMeter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Build the gateway.
    ///
    /// Nothing touches the network or the ledger until the first request.
    pub fn build(self) -> Result<Gateway> {
        if self.rate_limit_per_minute == 0 {
            return Err(GatewayError::Configuration(
                "rate limit must be at least one request per minute".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(GatewayError::Configuration(
                "similarity threshold must be within [0, 1]".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::Configuration(
                "HTTP timeout must be positive".into(),
            ));
        }
        if self.profiles.is_empty() {
            info!("no providers configured; only cached responses can be served");
        }

        let store = self
            .vector_store
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new(self.cache.collection.clone())));
        let dispatcher = Dispatcher::with_router(self.profiles, self.router)
            .retry(self.retry)
            .timeout(self.timeout);

        Ok(Gateway {
            project_name: self.project_name,
            environment: self.environment,
            telemetry_enabled: self.telemetry_enabled,
            gateway_key: self.gateway_key,
            limiter: RateLimiter::new(self.rate_limit_per_minute),
            cache: SemanticCache::new(store, self.cache),
            dispatcher,
            meter: self.meter.unwrap_or_default(),
            ledger: Arc::new(EnergyLedger::from_config(&LedgerConfig {
                path: self.ledger_path,
            })),
        })
    }
}
