//! GreenGate error types

/// GreenGate error types
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // Request errors
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("rate limit exceeded, please retry shortly")]
    RateLimitExceeded,

    #[error("gateway authentication failed")]
    Unauthorized,

    // Routing errors
    #[error("no provider available for model '{model}'")]
    NoProviderAvailable { model: String },

    // Upstream errors
    /// Connection failure or timeout talking to a provider.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Transport failures persisted through every retry.
    #[error("proxy request failed: {0}")]
    UpstreamUnreachable(String),

    /// Provider answered with a non-2xx status.
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("provider returned empty response")]
    EmptyResponse,

    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    /// Bad provider configuration, or an adapter that cannot resolve its target
    /// (e.g. Azure without a model name).
    #[error("configuration error: {0}")]
    Configuration(String),

    // Storage errors
    #[error("cache backend error: {0}")]
    Cache(String),

    #[error("ledger error: {0}")]
    Ledger(String),
}

impl GatewayError {
    /// Whether the dispatcher should retry this failure.
    ///
    /// Transport failures and 5xx upstream responses are transient; every
    /// other upstream status and all local failures are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status a front-end should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) | GatewayError::Configuration(_) => 400,
            GatewayError::Unauthorized => 401,
            GatewayError::RateLimitExceeded => 429,
            GatewayError::NoProviderAvailable { .. } => 503,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::Transport(_)
            | GatewayError::UpstreamUnreachable(_)
            | GatewayError::EmptyResponse
            | GatewayError::Stream(_) => 502,
            GatewayError::Json(_) | GatewayError::Cache(_) | GatewayError::Ledger(_) => 500,
        }
    }

    /// Error detail suitable for a response body.
    ///
    /// Upstream errors pass the provider's body through verbatim.
    pub fn detail(&self) -> String {
        match self {
            GatewayError::Upstream { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => GatewayError::Upstream {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None if err.is_decode() => GatewayError::Stream(err.to_string()),
            None => GatewayError::Transport(err.to_string()),
        }
    }
}

/// Result type alias for GreenGate operations
pub type Result<T> = std::result::Result<T, GatewayError>;
