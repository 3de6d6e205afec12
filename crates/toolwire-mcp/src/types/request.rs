//! MCP request parameter types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolwire::RequestId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Params of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
