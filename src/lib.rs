//! GreenGate - energy-aware gateway for LLM APIs
//!
//! This crate sits in front of several chat-completion providers and serves
//! each request as cheaply as it can: a two-tier semantic cache answers
//! repeated prompts without any upstream call, and misses are routed to the
//! provider with the best cost, latency, reliability, and energy trade-off.
//! Every served request is recorded in a durable energy ledger.
//!
//! # Example
//!
//! ```rust,no_run
//! use greengate::{ChatRequest, GreenGate, Message, ProviderKind, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> greengate::Result<()> {
//!     let gateway = GreenGate::builder()
//!         .provider(ProviderKind::OpenAi.default_profile().api_key("sk-your-key"))
//!         .ledger_path("data/energy.db")
//!         .build()?;
//!
//!     let request = ChatRequest::new(
//!         "gpt-4o-mini",
//!         vec![
//!             Message::system("You are a helpful assistant."),
//!             Message::user("What is the capital of France?"),
//!         ],
//!     );
//!
//!     let response = gateway.handle(request, RequestContext::new()).await?;
//!     for (name, value) in response.headers.to_pairs() {
//!         println!("{name}: {value}");
//!     }
//!     println!("{}", response.json().cloned().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`Config::load()`] reads `~/.greengate/config.toml` (or an explicit
//! path) and [`Secrets::load()`] reads API keys from `secrets.toml` or the
//! environment; [`GatewayBuilder::from_config()`] wires both together.

pub mod cache;
pub mod config;
pub mod energy;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod rate_limit;
pub mod telemetry;
pub mod tokenizer;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{GatewayError, Result};
pub use gateway::{
    Gateway, GatewayBuilder, GatewayHeaders, GatewayResponse, GatewayStatus, GreenGate,
    MeteredStream, ModelEntry, RequestContext, ResponseBody, ServeStatus,
};

pub use cache::{CacheConfig, CacheHit, InMemoryVectorStore, SemanticCache, VectorStore};
pub use config::{Config, Secrets};
pub use energy::{EnergyLedger, EnergyMeter, LedgerAverages, LedgerSnapshot};
pub use providers::{
    Dispatcher, ModelRouter, ProviderAdapter, ProviderKind, ProviderProfile, RetryConfig,
    RouterConfig, RouterWeights,
};
pub use rate_limit::{RateLimiter, TokenBucket};
pub use version::{PKG_VERSION, version_string};

// Re-export all types
pub use types::{
    ByteStream, ChatRequest, ContentPart, Message, MessageContent, ProviderResult, Role, Usage,
};
