//! Per-identity token-bucket admission control.
//!
//! Every caller identity gets its own bucket holding up to
//! `requests_per_minute` tokens, refilled continuously at
//! `requests_per_minute / 60` tokens per second. A request is admitted when
//! its bucket holds at least one token; rejected requests consume nothing.
//!
//! Buckets are created on first use and never evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::time::Instant;

use crate::{GatewayError, Result};

/// Identity used when the caller supplied none.
pub const ANONYMOUS: &str = "anonymous";

/// A refilling token bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket sized for `requests_per_minute`.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Refill for the time elapsed since the last call, then take one token if available.
    pub fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently held, as of the last refill.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Per-identity rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Admit or reject one request for `identity`.
    ///
    /// Empty identities share the [`ANONYMOUS`] bucket. Lookup, refill, and
    /// consumption happen under one lock.
    pub fn check(&self, identity: &str) -> Result<()> {
        let key = if identity.is_empty() {
            ANONYMOUS
        } else {
            identity
        };
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.requests_per_minute));
        if bucket.try_consume() {
            Ok(())
        } else {
            Err(GatewayError::RateLimitExceeded)
        }
    }

    /// Number of identities seen so far.
    pub fn tracked_identities(&self) -> usize {
        self.buckets
            .lock()
            .map(|b| b.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
