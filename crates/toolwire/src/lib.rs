//! toolwire — transport-agnostic JSON-RPC core for tool-invocation servers.

pub mod codec;
pub mod content;
pub mod correlation;
pub mod error;
pub mod handler;
pub mod message;
pub mod transport;

pub use codec::{decode, encode};
pub use content::{ResourceContent, ToolContent, ToolResponse};
pub use correlation::{BaseTransport, Lifecycle, PendingCall};
pub use error::{error_codes, mcp_error_codes, McpError, McpResult};
pub use handler::{CloseHandler, ErrorHandler, MessageHandler, RequestContext};
pub use message::*;
pub use transport::Transport;

pub use tokio_util::sync::CancellationToken;
