//! Dispatcher: owns the provider set, routes, and retries.
//!
//! Adapters (and the shared HTTP client behind them) are built lazily on the
//! first forwarded request, exactly once, even when many requests race to
//! trigger construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::adapter::ProviderAdapter;
use super::profile::ProviderProfile;
use super::retry::{RetryConfig, with_retry};
use super::routing::{ModelRouter, RouterConfig, order_by_preference};
use crate::types::{ChatRequest, ProviderResult};
use crate::{GatewayError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwards normalized requests to the best available provider.
pub struct Dispatcher {
    profiles: Vec<ProviderProfile>,
    router: ModelRouter,
    retry: RetryConfig,
    timeout: Duration,
    adapters: OnceCell<Vec<ProviderAdapter>>,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher over `profiles` with default routing and retry.
    pub fn new(profiles: Vec<ProviderProfile>) -> Self {
        Self::with_router(profiles, RouterConfig::default())
    }

    /// Create a dispatcher; profiles are ordered by the configured preference sequence.
    pub fn with_router(mut profiles: Vec<ProviderProfile>, router: RouterConfig) -> Self {
        order_by_preference(&mut profiles, &router.provider_sequence);
        Self {
            profiles,
            router: ModelRouter::new(router.weights),
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            adapters: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Set retry behaviour for transient upstream failures.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound every upstream call by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured profiles in preference order.
    pub fn profiles(&self) -> &[ProviderProfile] {
        &self.profiles
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Whether the adapter set has been built yet.
    pub fn is_initialized(&self) -> bool {
        self.adapters.initialized()
    }

    async fn adapters(&self) -> Result<&[ProviderAdapter]> {
        let adapters = self
            .adapters
            .get_or_try_init(|| async {
                let client = Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| {
                        GatewayError::Configuration(format!("failed to build HTTP client: {e}"))
                    })?;
                let adapters: Vec<_> = self
                    .profiles
                    .iter()
                    .map(|p| ProviderAdapter::new(p.clone(), client.clone()))
                    .collect();
                info!(
                    providers = ?adapters.iter().map(ProviderAdapter::name).collect::<Vec<_>>(),
                    "provider adapters initialized"
                );
                Ok::<_, GatewayError>(adapters)
            })
            .await?;
        Ok(adapters)
    }

    /// Route `request` and invoke the chosen provider, retrying transient failures.
    ///
    /// Streamed calls retry only the initial connection, never mid-stream failures.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn forward(&self, request: &ChatRequest, stream: bool) -> Result<ProviderResult> {
        if request.model.trim().is_empty() {
            return Err(GatewayError::Validation("model is required".into()));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(GatewayError::Configuration("dispatcher is closed".into()));
        }

        let adapters = self.adapters().await?;
        let adapter = self.router.select(adapters, &request.model)?;
        debug!(provider = adapter.name(), "provider selected");

        with_retry(&self.retry, adapter.name(), || adapter.invoke(request, stream)).await
    }

    /// Stop accepting requests. Pooled connections are released when the
    /// dispatcher is dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("dispatcher closed");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("profiles", &self.profiles)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
