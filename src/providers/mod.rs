//! Upstream providers.
//!
//! - [`ProviderProfile`] — immutable description of one upstream
//! - [`ProviderAdapter`] — wire-format translation and HTTP invocation
//! - [`ModelRouter`] — multi-objective provider selection
//! - [`Dispatcher`] — lazy provider set, routing, retry

mod adapter;
mod anthropic;
mod azure;
mod cohere;
mod dispatcher;
mod http;
mod openai;
mod profile;
pub mod retry;
pub mod routing;

pub use adapter::ProviderAdapter;
pub use dispatcher::Dispatcher;
pub use profile::{ProviderKind, ProviderProfile};
pub use retry::RetryConfig;
pub use routing::{ModelRouter, RouterConfig, RouterWeights};
