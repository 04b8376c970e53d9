//! Two-tier response cache for chat completions.
//!
//! # Tiers
//!
//! 1. **Exact** — a concurrent map keyed on the SHA-256 fingerprint of the
//!    serialized prompt. Hits report similarity 1.0 and never touch the
//!    vector store.
//! 2. **Similar** — a [`VectorStore`] query for the nearest stored prompt.
//!    Distance `d` converts to similarity `1 / (1 + d)` (1.0 when `d <= 0`);
//!    the match counts as a hit only at or above the configured threshold,
//!    and is then promoted into the exact tier, where later lookups report
//!    similarity 1.0.
//!
//! Vector store failures are logged and treated as misses on lookup and
//! ignored on store. Entries are never evicted; concurrent misses for the
//! same prompt may each persist a document.

use std::sync::Arc;

use moka::future::Cache;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::vector::{CacheMetadata, VectorStore};
use crate::telemetry;

/// Semantic cache configuration.
///
/// ```rust
/// # use greengate::CacheConfig;
/// let config = CacheConfig::new().similarity_threshold(0.9).top_k(5);
/// assert_eq!(config.query_size(), 5);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Minimum similarity for an approximate hit. Default: 0.95.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Candidates requested from the vector store. Default: 3.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper bound on `top_k`. Default: 8.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Vector store collection name. Default: "llm_cache".
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_similarity_threshold() -> f64 {
    0.95
}

fn default_top_k() -> usize {
    3
}

fn default_max_results() -> usize {
    8
}

fn default_collection() -> String {
    "llm_cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            max_results: default_max_results(),
            collection: default_collection(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    /// Number of candidates to request: `min(top_k, max_results)`.
    pub fn query_size(&self) -> usize {
        self.top_k.min(self.max_results)
    }
}

/// A cached response with the metadata it was stored under.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: Value,
    pub metadata: CacheMetadata,
    /// 1.0 for exact hits; computed from distance for approximate hits.
    pub similarity: f64,
}

impl CacheHit {
    /// Energy the original upstream call cost, now saved.
    pub fn estimated_energy(&self) -> f64 {
        self.metadata.energy_joules.max(0.0)
    }
}

/// What to remember about a fresh upstream response.
#[derive(Debug, Clone)]
pub struct CacheWrite<'a> {
    pub model: &'a str,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub energy_joules: f64,
    pub provider: &'a str,
}

/// SHA-256 hex digest of the prompt text.
pub fn fingerprint(prompt: &str) -> String {
    format!("{:x}", Sha256::digest(prompt.as_bytes()))
}

/// Convert a vector distance into a similarity in `[0, 1]`.
pub fn distance_to_similarity(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    if distance <= 0.0 {
        return 1.0;
    }
    1.0 / (1.0 + distance)
}

/// Exact map over an approximate vector store.
pub struct SemanticCache {
    exact: Cache<String, CacheHit>,
    store: Arc<dyn VectorStore>,
    config: CacheConfig,
}

impl SemanticCache {
    pub fn new(store: Arc<dyn VectorStore>, config: CacheConfig) -> Self {
        Self {
            exact: Cache::builder().build(),
            store,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Find a cached response for `prompt`.
    ///
    /// Emits cache hit/miss metrics.
    pub async fn lookup(&self, prompt: &str) -> Option<CacheHit> {
        let prompt_hash = fingerprint(prompt);
        if let Some(hit) = self.exact.get(&prompt_hash).await {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "exact").increment(1);
            return Some(hit);
        }

        match self.query_similar(prompt).await {
            Some(hit) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "similar").increment(1);
                let promoted = CacheHit {
                    similarity: 1.0,
                    ..hit.clone()
                };
                self.exact.insert(prompt_hash, promoted).await;
                Some(hit)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    async fn query_similar(&self, prompt: &str) -> Option<CacheHit> {
        let matches = match self.store.query(prompt, self.config.query_size()).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "cache lookup failed, treating as miss");
                return None;
            }
        };
        let closest = matches.into_iter().next()?;
        let similarity = distance_to_similarity(closest.distance);
        if similarity < self.config.similarity_threshold {
            debug!(similarity, "closest cached prompt below threshold");
            return None;
        }
        let response = match serde_json::from_str(&closest.metadata.response) {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %closest.id, error = %e, "cached response is not valid JSON");
                return None;
            }
        };
        Some(CacheHit {
            response,
            metadata: closest.metadata,
            similarity,
        })
    }

    /// Remember `response` for `prompt` in both tiers.
    ///
    /// The exact tier is updated immediately; a failed vector write is
    /// logged and otherwise ignored.
    pub async fn store(&self, prompt: &str, response: &Value, entry: CacheWrite<'_>) {
        let prompt_hash = fingerprint(prompt);
        let metadata = CacheMetadata {
            response: response.to_string(),
            prompt_hash: prompt_hash.clone(),
            model: entry.model.to_string(),
            prompt_tokens: entry.prompt_tokens,
            completion_tokens: entry.completion_tokens,
            energy_joules: entry.energy_joules,
            provider: entry.provider.to_string(),
        };
        let hit = CacheHit {
            response: response.clone(),
            metadata: metadata.clone(),
            similarity: 1.0,
        };
        self.exact.insert(prompt_hash.clone(), hit).await;

        let id = format!("{prompt_hash}:{}", uuid::Uuid::new_v4().simple());
        if let Err(e) = self
            .store
            .add(vec![prompt.to_string()], vec![metadata], vec![id])
            .await
        {
            warn!(error = %e, "cache save failed");
        }
    }

    /// Number of prompts in the exact tier, after pending writes settle.
    pub async fn exact_entries(&self) -> u64 {
        self.exact.run_pending_tasks().await;
        self.exact.entry_count()
    }
}
