//! toolwire-mcp — MCP tool server runtime over stdio or stateless HTTP.

pub mod config;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use protocol::ProtocolHandler;
pub use server::Server;
pub use tools::{Tool, ToolContext, ToolRegistry};
#[cfg(feature = "http")]
pub use transport::StatelessTransport;
#[cfg(feature = "stdio")]
pub use transport::StdioTransport;
pub use transport::StreamTransport;
