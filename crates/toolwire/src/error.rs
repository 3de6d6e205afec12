//! Error types and JSON-RPC error codes.

use crate::message::{JsonRpcResponse, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Server-defined error codes.
pub mod mcp_error_codes {
    /// A tool handler returned an error.
    pub const TOOL_EXECUTION_FAILED: i32 = -32000;
    pub const REQUEST_CANCELLED: i32 = -32800;
}

/// All errors raised by the runtime.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    /// Bytes were not a well-formed envelope. `id` is set when the
    /// identifier could still be recovered from the input.
    #[error("Parse error: {reason}")]
    Decode {
        reason: String,
        id: Option<RequestId>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate request id: {0}")]
    DuplicateId(RequestId),

    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// A response envelope arrived on a channel that only accepts calls.
    #[error("Unexpected response envelope for id {0}")]
    UnexpectedResponse(RequestId),

    #[error("Timed out waiting for response to request {0}")]
    Timeout(RequestId),

    #[error("Transport closed")]
    Closed,

    #[error("No pending request for id {0}")]
    NotFound(RequestId),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No message handler registered")]
    NoMessageHandler,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn decode(reason: impl Into<String>) -> Self {
        McpError::Decode {
            reason: reason.into(),
            id: None,
        }
    }

    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::Decode { .. } | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) | McpError::UnexpectedResponse(_) => INVALID_REQUEST,
            McpError::UnknownMethod(_) => METHOD_NOT_FOUND,
            McpError::InvalidArguments(_) => INVALID_PARAMS,
            McpError::ToolFailed { .. } => TOOL_EXECUTION_FAILED,
            McpError::RequestCancelled => REQUEST_CANCELLED,
            McpError::DuplicateId(_)
            | McpError::DuplicateName(_)
            | McpError::Timeout(_)
            | McpError::Closed
            | McpError::NotFound(_)
            | McpError::InvalidState(_)
            | McpError::NoMessageHandler
            | McpError::Internal(_)
            | McpError::Transport(_)
            | McpError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Whether the remote caller should see this error as a JSON-RPC
    /// error response while the connection stays open.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            McpError::Decode { .. }
                | McpError::InvalidRequest(_)
                | McpError::UnknownMethod(_)
                | McpError::InvalidArguments(_)
                | McpError::ToolFailed { .. }
                | McpError::RequestCancelled
        )
    }

    pub fn to_response(&self, id: RequestId) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.code(), self.to_string())
    }
}

pub type McpResult<T> = Result<T, McpError>;
