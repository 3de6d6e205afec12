//! Transport layer for MCP communication.

pub mod framing;
#[cfg(feature = "http")]
pub mod http;
pub mod stream;

#[cfg(feature = "http")]
pub use http::StatelessTransport;
#[cfg(feature = "stdio")]
pub use stream::StdioTransport;
pub use stream::StreamTransport;
