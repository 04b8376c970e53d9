//! The gateway: admission, caching, dispatch, and energy accounting.

mod builder;
mod pipeline;
mod stream;

pub use builder::{GatewayBuilder, GreenGate};
pub use pipeline::{
    CACHE_PROVIDER, ENERGY_HEADER, Gateway, GatewayHeaders, GatewayResponse, GatewayStatus,
    ModelEntry, PROVIDER_HEADER, RequestContext, ResponseBody, SIMILARITY_HEADER, STATUS_HEADER,
    ServeStatus, format_joules,
};
pub use stream::MeteredStream;
