//! MCP data types used by the server, on top of the core envelope types.

pub mod capabilities;
pub mod request;
pub mod response;

pub use capabilities::*;
pub use request::*;
pub use response::*;

pub use toolwire::{
    error_codes, mcp_error_codes, JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, McpError, McpResult, RequestId, ResourceContent,
    ResponseOutcome, ToolContent, ToolResponse, JSONRPC_VERSION,
};
