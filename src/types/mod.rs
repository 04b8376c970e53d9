//! Public types for the GreenGate API.

mod message;
mod request;
mod response;

pub use message::{ContentPart, Message, MessageContent, Role};
pub use request::ChatRequest;
pub use response::{ByteStream, ProviderResult, Usage};
