//! Request dispatcher — routes decoded JSON-RPC calls to the registry.

use std::sync::Arc;
use tokio::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use toolwire::{MessageHandler, RequestContext};

use crate::config::ServerConfig;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::*;

use super::negotiation::NegotiatedCapabilities;

/// Answers MCP lifecycle methods and dispatches tool calls.
///
/// A request whose method is a registered tool name is treated as a call
/// to that tool with `params` as its arguments.
pub struct ProtocolHandler {
    registry: Arc<ToolRegistry>,
    config: ServerConfig,
    capabilities: Mutex<NegotiatedCapabilities>,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<ToolRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config,
            capabilities: Mutex::new(NegotiatedCapabilities::default()),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.capabilities.lock().await.initialized
    }

    async fn dispatch_request(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
    ) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(Value::Object(serde_json::Map::new())),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => {
                let params: ToolCallParams = required_params(request.params, "Tool call")?;
                self.call_tool(&params.name, params.arguments, ctx).await
            }
            method if self.registry.contains(method) => {
                self.call_tool(method, request.params, ctx).await
            }
            method => Err(McpError::UnknownMethod(method.to_string())),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = required_params(params, "Initialize")?;
        let server_info = Implementation {
            name: self.config.name.clone(),
            version: self.config.version.clone(),
        };

        let result = self.capabilities.lock().await.negotiate(
            params,
            server_info,
            self.config.instructions.clone(),
        );
        serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
    }

    fn handle_tools_list(&self) -> McpResult<Value> {
        let result = ToolListResult {
            tools: self.registry.list_tools(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        ctx: &RequestContext,
    ) -> McpResult<Value> {
        let tool_ctx =
            ToolContext::new(Some(ctx.id().clone()), ctx.cancellation_token().clone());
        let result = self.registry.dispatch(name, arguments, tool_ctx).await?;
        if ctx.is_cancelled() {
            return Err(McpError::RequestCancelled);
        }
        serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
    }
}

#[async_trait]
impl MessageHandler for ProtocolHandler {
    async fn on_request(&self, request: JsonRpcRequest, ctx: RequestContext) -> JsonRpcResponse {
        let id = request.id.clone();
        let method = request.method.clone();

        match self.dispatch_request(request, &ctx).await {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                tracing::debug!("{method} failed: {e}");
                e.to_response(id)
            }
        }
    }

    async fn on_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.capabilities.lock().await.mark_initialized();
            }
            // Cancellation is acted on by the transport that owns the
            // in-flight request.
            "notifications/cancelled" => {
                tracing::debug!("Cancellation notification reached protocol handler");
            }
            other => {
                tracing::debug!("Unknown notification: {other}");
            }
        }
    }
}

fn required_params<T: DeserializeOwned>(params: Option<Value>, what: &str) -> McpResult<T> {
    let params =
        params.ok_or_else(|| McpError::InvalidArguments(format!("{what} params required")))?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin_tools;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn handler() -> ProtocolHandler {
        let registry = Arc::new(ToolRegistry::new());
        for tool in builtin_tools().unwrap() {
            registry.register(tool).unwrap();
        }
        ProtocolHandler::new(registry, ServerConfig::default().with_name("test-server"))
    }

    async fn call(
        handler: &ProtocolHandler,
        method: &str,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let ctx = RequestContext::new(RequestId::Number(1), CancellationToken::new());
        handler
            .on_request(JsonRpcRequest::new(1i64, method, params), ctx)
            .await
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let handler = handler();
        let resp = call(
            &handler,
            "initialize",
            Some(json!({
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "1.0" }
            })),
        )
        .await;
        let result = resp.result().unwrap();
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert_eq!(result["serverInfo"]["name"], "test-server");
        assert!(result["capabilities"]["tools"].is_object());

        assert!(!handler.is_initialized().await);
        handler
            .on_notification(JsonRpcNotification::new("notifications/initialized", None))
            .await;
        assert!(handler.is_initialized().await);
    }

    #[tokio::test]
    async fn test_initialize_without_params() {
        let resp = call(&handler(), "initialize", None).await;
        assert_eq!(resp.error_object().unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_ping() {
        let resp = call(&handler(), "ping", None).await;
        assert_eq!(resp.result(), Some(&json!({})));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let resp = call(&handler(), "tools/list", None).await;
        let tools = resp.result().unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["hello", "time"]);
        assert!(tools[0]["inputSchema"]["properties"]["submitter"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let resp = call(
            &handler(),
            "tools/call",
            Some(json!({"name": "hello", "arguments": {"submitter": "openai"}})),
        )
        .await;
        assert_eq!(
            resp.result().unwrap(),
            &json!({"content": [{"type": "text", "text": "Hello, openai!"}]})
        );
    }

    #[tokio::test]
    async fn test_direct_tool_method() {
        let resp = call(&handler(), "time", Some(json!({"format": "%Y"}))).await;
        let text = resp.result().unwrap()["content"][0]["text"].as_str().unwrap().to_string();
        assert_eq!(text.len(), 4);
        assert!(text.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = call(&handler(), "nope", None).await;
        let err = resp.error_object().unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
        assert!(err.message.contains("nope"));
    }

    #[tokio::test]
    async fn test_unknown_tool_via_tools_call() {
        let resp = call(&handler(), "tools/call", Some(json!({"name": "nope"}))).await;
        assert_eq!(resp.error_object().unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_response() {
        let resp = call(&handler(), "time", Some(json!({"format": "%Q"}))).await;
        let err = resp.error_object().unwrap();
        assert_eq!(err.code, mcp_error_codes::TOOL_EXECUTION_FAILED);
        assert!(err.message.contains("invalid time format"));
    }

    #[tokio::test]
    async fn test_cancelled_call_reports_cancellation() {
        let handler = handler();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::new(RequestId::Number(9), token);
        let resp = handler
            .on_request(
                JsonRpcRequest::new(9i64, "hello", Some(json!({"submitter": "x"}))),
                ctx,
            )
            .await;
        assert_eq!(resp.error_object().unwrap().code, mcp_error_codes::REQUEST_CANCELLED);
    }
}
