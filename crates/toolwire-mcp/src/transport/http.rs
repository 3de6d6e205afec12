//! Stateless HTTP transport — one POST carries one JSON-RPC exchange.
//!
//! The physical call is the correlation unit, so no pending entries are
//! ever created here.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{any, get},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use toolwire::handler::{run_notification_isolated, run_request_isolated};
use toolwire::{
    BaseTransport, CloseHandler, ErrorHandler, Lifecycle, MessageHandler, RequestContext,
    Transport,
};

use crate::types::{error_codes, JsonRpcMessage, McpError, McpResult};

/// Body returned for anything but `POST /mcp`.
pub const METHOD_NOT_ALLOWED_BODY: &str = "Only POST method is supported";

/// Request/response transport bound to an HTTP route.
#[derive(Default)]
pub struct StatelessTransport {
    base: BaseTransport,
}

impl StatelessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.base.lifecycle()
    }

    /// Always zero; exposed so callers can check nothing leaks.
    pub fn pending_requests(&self) -> usize {
        self.base.pending_count()
    }

    /// Decode one inbound envelope, run it through the message handler
    /// and return the encoded response. Notifications yield `None`.
    ///
    /// `cancellation` is handed to the handler and should fire when the
    /// caller goes away.
    pub async fn handle_inbound(
        &self,
        body: &[u8],
        cancellation: CancellationToken,
    ) -> McpResult<Option<Vec<u8>>> {
        match self.base.lifecycle() {
            Lifecycle::Started => {}
            Lifecycle::Created => {
                return Err(McpError::InvalidState("transport not started".into()))
            }
            Lifecycle::Closed => return Err(McpError::Closed),
        }

        let message = match toolwire::decode(body) {
            Ok(message) => message,
            Err(e) => {
                self.base.report_error(&e);
                // With a recoverable id the caller gets a JSON-RPC error.
                if let McpError::Decode { id: Some(id), .. } = &e {
                    let response = e.to_response(id.clone());
                    return Ok(Some(toolwire::encode(&response.into())));
                }
                return Err(e);
            }
        };
        let handler = self.base.message_handler().ok_or(McpError::NoMessageHandler)?;

        match message {
            JsonRpcMessage::Request(request) => {
                let ctx = RequestContext::new(request.id.clone(), cancellation);
                let response = run_request_isolated(handler, request, ctx)
                    .await
                    .inspect_err(|e| self.base.report_error(e))?;
                Ok(Some(toolwire::encode(&response.into())))
            }
            JsonRpcMessage::Notification(notification) => {
                run_notification_isolated(handler, notification)
                    .await
                    .inspect_err(|e| self.base.report_error(e))?;
                Ok(None)
            }
            JsonRpcMessage::Response(response) => {
                let err = McpError::UnexpectedResponse(response.id);
                self.base.report_error(&err);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Transport for StatelessTransport {
    async fn start(&self) -> McpResult<()> {
        self.base.mark_started()?;
        tracing::info!("Stateless HTTP transport started");
        Ok(())
    }

    async fn send(&self, _message: JsonRpcMessage) -> McpResult<()> {
        Err(McpError::Transport(
            "stateless transport cannot originate messages".to_string(),
        ))
    }

    async fn close(&self) -> McpResult<()> {
        if self.base.mark_closed() {
            tracing::info!("Stateless HTTP transport closed");
        }
        Ok(())
    }

    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.base.set_message_handler(handler);
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        self.base.set_error_handler(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        self.base.set_close_handler(handler);
    }
}

/// Shared state passed to all routes via axum State.
pub struct HttpState {
    pub transport: Arc<StatelessTransport>,
    pub token: Option<String>,
}

/// `/mcp` (bearer-protected when `token` is set), `/health`, CORS.
pub fn router(transport: Arc<StatelessTransport>, token: Option<String>) -> Router {
    let state = Arc::new(HttpState { transport, token });

    Router::new()
        .route("/mcp", any(handle_mcp))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(handle_health))
        .layer(tower::ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(
    addr: &str,
    transport: Arc<StatelessTransport>,
    token: Option<String>,
    shutdown: CancellationToken,
) -> McpResult<()> {
    let app = router(transport, token);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("HTTP transport listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| McpError::Transport(e.to_string()))?;

    Ok(())
}

async fn handle_mcp(
    State(state): State<Arc<HttpState>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY).into_response();
    }

    // Fires when the response is produced or the client disconnects.
    let cancellation = CancellationToken::new();
    let _guard = cancellation.clone().drop_guard();

    match state.transport.handle_inbound(&body, cancellation).await {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => (status_for(&e), e.to_string()).into_response(),
    }
}

fn status_for(err: &McpError) -> StatusCode {
    match err {
        McpError::Decode { .. } | McpError::UnexpectedResponse(_) => StatusCode::BAD_REQUEST,
        McpError::Closed | McpError::InvalidState(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Auth middleware — checks Bearer token if configured.
/// /health is handled by a separate route that bypasses this layer.
async fn auth_layer(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.token {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                AxumJson(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {
                        "code": error_codes::INVALID_REQUEST,
                        "message": "Unauthorized"
                    }
                })),
            )
                .into_response();
        }
    }

    next.run(request).await
}

/// Health check endpoint — no auth required.
async fn handle_health(State(state): State<Arc<HttpState>>) -> AxumJson<serde_json::Value> {
    let status = match state.transport.lifecycle() {
        Lifecycle::Started => "ok",
        Lifecycle::Created => "starting",
        Lifecycle::Closed => "closed",
    };
    AxumJson(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
