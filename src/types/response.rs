//! Provider results and streaming types

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Lazy, forward-only sequence of raw response chunks from an upstream.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Token usage statistics, normalized across providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// True when the provider reported nothing usable.
    pub fn is_unknown(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// Outcome of one successful adapter invocation.
///
/// Unary calls carry `response`; streamed calls carry `stream` instead.
pub struct ProviderResult {
    pub provider_name: String,
    pub response: Option<serde_json::Value>,
    pub usage: Usage,
    /// Assistant text extracted from `response`, when the provider shape is known.
    pub completion: Option<String>,
    pub energy_modifier: f64,
    pub stream: Option<ByteStream>,
}

impl ProviderResult {
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }
}

impl fmt::Debug for ProviderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderResult")
            .field("provider_name", &self.provider_name)
            .field("response", &self.response)
            .field("usage", &self.usage)
            .field("energy_modifier", &self.energy_modifier)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}
