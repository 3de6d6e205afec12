//! Lifecycle hooks a transport invokes: message, error, close.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, McpResult};
use crate::message::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Per-request execution context handed to the message handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: RequestId,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(id: RequestId, cancellation: CancellationToken) -> Self {
        Self { id, cancellation }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the caller has given up on this request.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Receives decoded inbound calls.
///
/// Implementations are shared across every in-flight request on every
/// connection and must tolerate concurrent invocation.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a request and produce its response. Failures are expected
    /// to come back as error responses, not panics.
    async fn on_request(&self, request: JsonRpcRequest, ctx: RequestContext) -> JsonRpcResponse;

    /// Handle a notification. No response is sent.
    async fn on_notification(&self, notification: JsonRpcNotification);
}

/// Called with every transport-level fault that has nowhere else to go.
pub type ErrorHandler = Arc<dyn Fn(&McpError) + Send + Sync>;

/// Called exactly once when a transport closes.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Run a request through the handler on its own task so a panicking
/// handler cannot take the calling loop down with it.
pub async fn run_request_isolated(
    handler: Arc<dyn MessageHandler>,
    request: JsonRpcRequest,
    ctx: RequestContext,
) -> McpResult<JsonRpcResponse> {
    let method = request.method.clone();
    tokio::spawn(async move { handler.on_request(request, ctx).await })
        .await
        .map_err(|e| {
            tracing::error!("Handler for {method} aborted: {e}");
            McpError::Internal(format!("handler for {method} failed: {e}"))
        })
}

/// Notification counterpart of [`run_request_isolated`].
pub async fn run_notification_isolated(
    handler: Arc<dyn MessageHandler>,
    notification: JsonRpcNotification,
) -> McpResult<()> {
    let method = notification.method.clone();
    tokio::spawn(async move { handler.on_notification(notification).await })
        .await
        .map_err(|e| {
            tracing::error!("Notification handler for {method} aborted: {e}");
            McpError::Internal(format!("notification handler for {method} failed: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Flaky;

    #[async_trait]
    impl MessageHandler for Flaky {
        async fn on_request(
            &self,
            request: JsonRpcRequest,
            _ctx: RequestContext,
        ) -> JsonRpcResponse {
            if request.method == "boom" {
                panic!("handler exploded");
            }
            JsonRpcResponse::success(request.id, json!("fine"))
        }

        async fn on_notification(&self, _notification: JsonRpcNotification) {
            panic!("notification exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let handler: Arc<dyn MessageHandler> = Arc::new(Flaky);
        let ctx = RequestContext::new(RequestId::Number(1), CancellationToken::new());

        let boom = JsonRpcRequest::new(1i64, "boom", None);
        let err = run_request_isolated(handler.clone(), boom, ctx.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Internal(_)));

        let calm = JsonRpcRequest::new(2i64, "calm", None);
        let ok = run_request_isolated(handler.clone(), calm, ctx).await.unwrap();
        assert_eq!(ok.result(), Some(&json!("fine")));

        let notif = run_notification_isolated(handler, JsonRpcNotification::new("n", None)).await;
        assert!(notif.is_err());
    }

    #[tokio::test]
    async fn test_context_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(RequestId::from("r"), token.child_token());
        assert!(!ctx.is_cancelled());
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
