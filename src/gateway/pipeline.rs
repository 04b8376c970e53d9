//! The request pipeline.
//!
//! # Flow
//!
//! ```text
//! validate → rate limit → (stream? dispatch + meter)
//!                       → cache lookup ─ hit → ledger (saved) → cached body
//!                                      └ miss → dispatch → usage/estimate
//!                                               → energy → cache store → ledger (spent)
//! ```
//!
//! Each outcome carries the gateway headers a front-end should attach.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::stream::{MeteredStream, StreamFinalizer};
use crate::cache::{CacheWrite, SemanticCache};
use crate::energy::{EnergyLedger, EnergyMeter};
use crate::providers::Dispatcher;
use crate::rate_limit::{ANONYMOUS, RateLimiter};
use crate::telemetry;
use crate::tokenizer;
use crate::types::ChatRequest;
use crate::{GatewayError, Result};

/// `X-Gateway-Status`
pub const STATUS_HEADER: &str = "X-Gateway-Status";
/// `X-Gateway-Energy-Joules`
pub const ENERGY_HEADER: &str = "X-Gateway-Energy-Joules";
/// `X-Gateway-Cache-Similarity`
pub const SIMILARITY_HEADER: &str = "X-Gateway-Cache-Similarity";
/// `X-Gateway-Provider`
pub const PROVIDER_HEADER: &str = "X-Gateway-Provider";

/// Provider name reported for cache hits.
pub const CACHE_PROVIDER: &str = "cache";

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServeStatus {
    CacheHit,
    CacheMiss,
    Streaming,
}

impl ServeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServeStatus::CacheHit => "CACHE_HIT",
            ServeStatus::CacheMiss => "CACHE_MISS",
            ServeStatus::Streaming => "STREAMING",
        }
    }
}

/// Gateway response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayHeaders {
    pub status: ServeStatus,
    pub energy_joules: String,
    /// Absent on streamed responses.
    pub similarity: Option<String>,
    pub provider: String,
}

impl GatewayHeaders {
    /// Header name/value pairs in a fixed order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (STATUS_HEADER, self.status.as_str().to_string()),
            (ENERGY_HEADER, self.energy_joules.clone()),
        ];
        if let Some(ref similarity) = self.similarity {
            pairs.push((SIMILARITY_HEADER, similarity.clone()));
        }
        pairs.push((PROVIDER_HEADER, self.provider.clone()));
        pairs
    }
}

/// Response payload.
pub enum ResponseBody {
    Json(Value),
    Stream(MeteredStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ResponseBody::Stream(s) => f.debug_tuple("Stream").field(s).finish(),
        }
    }
}

/// A served request.
#[derive(Debug)]
pub struct GatewayResponse {
    pub headers: GatewayHeaders,
    pub body: ResponseBody,
}

impl GatewayResponse {
    /// The JSON body, if this was a unary response.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Take the chunk stream, if this was a streamed response.
    pub fn into_stream(self) -> Option<MeteredStream> {
        match self.body {
            ResponseBody::Stream(s) => Some(s),
            ResponseBody::Json(_) => None,
        }
    }
}

/// Per-request facts supplied by the front-end.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Remote address, used as the identity when the request names no user.
    pub client_addr: Option<String>,
    /// Correlation id for tracing.
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// A model offered through the configured providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub id: String,
    /// Provider names serving the model, sorted.
    pub providers: Vec<String>,
}

/// Instance summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub project: String,
    pub environment: String,
    pub requests_served: u64,
    pub energy_spent_joules: f64,
    pub energy_saved_joules: f64,
}

/// Format joules the way the energy header reports them (`4.5`, `0.0`).
pub fn format_joules(joules: f64) -> String {
    if joules.is_finite() && joules.fract() == 0.0 {
        format!("{joules:.1}")
    } else {
        format!("{joules}")
    }
}

/// Emit request-level metrics.
pub(crate) fn record_request(provider: &str, cache: &'static str, status: &str, spent: f64, saved: f64) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "cache" => cache,
        "status" => status.to_owned(),
    )
    .increment(1);
    if spent > 0.0 {
        metrics::histogram!(telemetry::ENERGY_SPENT_JOULES).record(spent);
    }
    if saved > 0.0 {
        metrics::histogram!(telemetry::ENERGY_SAVED_JOULES).record(saved);
    }
}

/// The assembled gateway. Build with [`GreenGate::builder()`](super::GreenGate::builder).
pub struct Gateway {
    pub(super) project_name: String,
    pub(super) environment: String,
    pub(super) telemetry_enabled: bool,
    pub(super) gateway_key: Option<String>,
    pub(super) limiter: RateLimiter,
    pub(super) cache: SemanticCache,
    pub(super) dispatcher: Dispatcher,
    pub(super) meter: EnergyMeter,
    pub(super) ledger: Arc<EnergyLedger>,
}

impl Gateway {
    /// Serve one chat-completion request.
    #[instrument(
        skip(self, request, context),
        fields(model = %request.model, stream = request.stream, request_id = context.request_id.as_deref().unwrap_or(""))
    )]
    pub async fn handle(
        &self,
        request: ChatRequest,
        context: RequestContext,
    ) -> Result<GatewayResponse> {
        request.validate()?;

        let identity = request
            .user
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(context.client_addr.as_deref().filter(|a| !a.is_empty()))
            .unwrap_or(ANONYMOUS);
        if let Err(e) = self.limiter.check(identity) {
            debug!(identity, "rate limited");
            if self.telemetry_enabled {
                metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            }
            return Err(e);
        }

        if request.stream {
            return self.handle_streaming(&request).await;
        }

        let prompt = request.cache_prompt();
        if let Some(hit) = self.cache.lookup(&prompt).await {
            debug!(similarity = hit.similarity, "cache hit");
            let saved = hit.estimated_energy();
            self.ledger
                .record(
                    0.0,
                    saved,
                    hit.metadata.prompt_tokens,
                    hit.metadata.completion_tokens,
                )
                .await?;
            if self.telemetry_enabled {
                record_request(CACHE_PROVIDER, "hit", "200", 0.0, saved);
            }
            return Ok(GatewayResponse {
                headers: GatewayHeaders {
                    status: ServeStatus::CacheHit,
                    energy_joules: "0.0".to_string(),
                    similarity: Some(format!("{:.3}", hit.similarity)),
                    provider: CACHE_PROVIDER.to_string(),
                },
                body: ResponseBody::Json(hit.response),
            });
        }

        let result = self.forward_timed(&request, false).await?;
        let body = result.response.ok_or(GatewayError::EmptyResponse)?;

        let mut usage = result.usage;
        if usage.is_unknown() {
            usage = tokenizer::estimate_usage(&request, result.completion.as_deref().unwrap_or(""));
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "usage estimated locally"
            );
        }

        let energy = self.meter.calculate(
            &request.model,
            usage.prompt_tokens,
            usage.completion_tokens,
            result.energy_modifier,
        );

        self.cache
            .store(
                &prompt,
                &body,
                CacheWrite {
                    model: &request.model,
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    energy_joules: energy,
                    provider: &result.provider_name,
                },
            )
            .await;

        self.ledger
            .record(energy, 0.0, usage.prompt_tokens, usage.completion_tokens)
            .await?;

        if self.telemetry_enabled {
            record_request(&result.provider_name, "miss", "200", energy, 0.0);
        }

        Ok(GatewayResponse {
            headers: GatewayHeaders {
                status: ServeStatus::CacheMiss,
                energy_joules: format_joules(energy),
                similarity: Some("0.000".to_string()),
                provider: result.provider_name,
            },
            body: ResponseBody::Json(body),
        })
    }

    async fn handle_streaming(&self, request: &ChatRequest) -> Result<GatewayResponse> {
        let result = self.forward_timed(request, true).await?;
        let stream = result
            .stream
            .ok_or_else(|| GatewayError::Stream("provider does not support streaming".into()))?;

        let prompt_tokens = tokenizer::count_tokens(&request.prompt_text(), &request.model);
        let energy =
            self.meter
                .calculate(&request.model, prompt_tokens, 0, result.energy_modifier);

        let finalizer = StreamFinalizer {
            ledger: Arc::clone(&self.ledger),
            provider: result.provider_name.clone(),
            energy_joules: energy,
            prompt_tokens,
            telemetry_enabled: self.telemetry_enabled,
        };

        Ok(GatewayResponse {
            headers: GatewayHeaders {
                status: ServeStatus::Streaming,
                energy_joules: format_joules(energy),
                similarity: None,
                provider: result.provider_name,
            },
            body: ResponseBody::Stream(MeteredStream::new(stream, finalizer)),
        })
    }

    async fn forward_timed(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<crate::types::ProviderResult> {
        let started = Instant::now();
        let result = self.dispatcher.forward(request, stream).await;
        if self.telemetry_enabled {
            match &result {
                Ok(r) => {
                    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                        "provider" => r.provider_name.clone(),
                    )
                    .record(started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    metrics::counter!(telemetry::REQUESTS_TOTAL,
                        "provider" => "none",
                        "cache" => "miss",
                        "status" => e.status_code().to_string(),
                    )
                    .increment(1);
                }
            }
        }
        result
    }

    /// Check client credentials against the configured gateway key.
    ///
    /// `authorization` is the raw `Authorization` header value
    /// (`Bearer <key>`); `api_key` is the `X-API-Key` header value. Every
    /// request is admitted when no gateway key is configured.
    pub fn authorize(&self, authorization: Option<&str>, api_key: Option<&str>) -> Result<()> {
        let Some(ref expected) = self.gateway_key else {
            return Ok(());
        };
        let bearer = authorization.and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
        if bearer == Some(expected.as_str()) || api_key == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }

    /// Models explicitly listed by configured providers, sorted by id.
    ///
    /// Providers that accept any model are not enumerated.
    pub fn list_models(&self) -> Vec<ModelEntry> {
        let mut models: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for profile in self.dispatcher.profiles() {
            for model in &profile.supported_models {
                models
                    .entry(model.as_str())
                    .or_default()
                    .insert(profile.name.as_str());
            }
        }
        models
            .into_iter()
            .map(|(id, providers)| ModelEntry {
                id: id.to_string(),
                providers: providers.into_iter().map(String::from).collect(),
            })
            .collect()
    }

    /// Project identity plus ledger totals.
    pub async fn status(&self) -> Result<GatewayStatus> {
        let snapshot = self.ledger.snapshot().await?;
        Ok(GatewayStatus {
            project: self.project_name.clone(),
            environment: self.environment.clone(),
            requests_served: snapshot.requests,
            energy_spent_joules: snapshot.energy_spent,
            energy_saved_joules: snapshot.energy_saved,
        })
    }

    /// Stop forwarding requests upstream.
    pub fn close(&self) {
        self.dispatcher.close();
    }

    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    pub fn energy_meter(&self) -> &EnergyMeter {
        &self.meter
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("project_name", &self.project_name)
            .field("environment", &self.environment)
            .field("telemetry_enabled", &self.telemetry_enabled)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joules_format_like_decimals() {
        assert_eq!(format_joules(0.0), "0.0");
        assert_eq!(format_joules(4.5), "4.5");
        assert_eq!(format_joules(10.0), "10.0");
        assert_eq!(format_joules(0.123456), "0.123456");
    }

    #[test]
    fn stream_headers_omit_similarity() {
        let headers = GatewayHeaders {
            status: ServeStatus::Streaming,
            energy_joules: "0.1".into(),
            similarity: None,
            provider: "openai".into(),
        };
        let names: Vec<_> = headers.to_pairs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, [STATUS_HEADER, ENERGY_HEADER, PROVIDER_HEADER]);
    }
}
