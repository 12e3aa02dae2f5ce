//! Provider layer: configuration resolution, request composition and
//! response decoding for the three supported chat-completion backends.

pub mod config;
pub mod request;
pub mod shape;
pub mod stream;

pub use config::{resolve, Provider, ProviderConfig};
pub use request::RequestOptions;
pub use stream::StreamDecoder;
