//! MCP protocol handling — JSON-RPC method routing on top of the registry.

pub mod handler;
pub mod negotiation;

pub use handler::ProtocolHandler;
pub use negotiation::NegotiatedCapabilities;
