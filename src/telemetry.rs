//! Telemetry metric name constants.
//!
//! Centralised metric names for gateway operations. Deployments install
//! their own `metrics` recorder (e.g. prometheus); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `greengate_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`, `_joules`).
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "openai", "azure-openai", "cache")
//! - `cache` — cache outcome: "hit" or "miss"
//! - `status` — response status code as a string (e.g. "200")

/// Total chat completion requests served.
///
/// Labels: `provider`, `cache` ("hit" | "miss"), `status`.
pub const REQUESTS_TOTAL: &str = "greengate_requests_total";

/// Joules spent per request (only observed when non-zero).
pub const ENERGY_SPENT_JOULES: &str = "greengate_energy_joules";

/// Joules saved per cache hit (only observed when non-zero).
pub const ENERGY_SAVED_JOULES: &str = "greengate_energy_saved_joules";

/// Upstream call duration in seconds, including retries.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "greengate_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "greengate_retries_total";

/// Total semantic cache hits.
///
/// Labels: `tier` ("exact" | "similar").
pub const CACHE_HITS_TOTAL: &str = "greengate_cache_hits_total";

/// Total semantic cache misses.
pub const CACHE_MISSES_TOTAL: &str = "greengate_cache_misses_total";

/// Total requests rejected by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "greengate_rate_limited_total";
