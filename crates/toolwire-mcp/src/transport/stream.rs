//! Persistent-stream transport — one duplex byte stream carries many
//! interleaved requests, responses and notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use toolwire::handler::{run_notification_isolated, run_request_isolated};
use toolwire::{
    BaseTransport, CloseHandler, ErrorHandler, Lifecycle, MessageHandler, RequestContext,
    Transport,
};

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::types::{
    CancelledParams, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    McpError, McpResult, RequestId,
};

use super::framing;

/// Stdio transport for desktop MCP clients.
#[cfg(feature = "stdio")]
pub type StdioTransport = StreamTransport<tokio::io::Stdin, tokio::io::Stdout>;

#[cfg(feature = "stdio")]
impl StreamTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Read JSON-RPC from stdin, write to stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

/// Newline-delimited JSON-RPC over any async reader/writer pair.
///
/// Inbound requests run concurrently on their own tasks and answer on
/// the same stream. Inbound responses are routed to the caller waiting
/// in [`StreamTransport::request`].
pub struct StreamTransport<R, W> {
    inner: Arc<Connection<W>>,
    reader: Mutex<Option<R>>,
    request_timeout: Duration,
}

struct Connection<W> {
    id: String,
    base: BaseTransport,
    writer: tokio::sync::Mutex<W>,
    shutdown_token: CancellationToken,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
    next_id: AtomicI64,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            inner: Arc::new(Connection {
                id: uuid::Uuid::new_v4().to_string(),
                base: BaseTransport::new(),
                writer: tokio::sync::Mutex::new(writer),
                shutdown_token: CancellationToken::new(),
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }),
            reader: Mutex::new(Some(reader)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// How long [`StreamTransport::request`] waits for the peer.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.base.lifecycle()
    }

    /// Outstanding server-originated requests.
    pub fn pending_requests(&self) -> usize {
        self.inner.base.pending_count()
    }

    /// Resolves once the connection has shut down.
    pub async fn closed(&self) {
        self.inner.shutdown_token.cancelled().await
    }

    /// Send a request to the peer and wait for its response.
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> McpResult<JsonRpcResponse> {
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        // Registered before writing so a fast reply cannot miss its entry.
        let call = self.inner.base.register_pending(id.clone())?;
        self.send(JsonRpcRequest::new(id, method, params).into())
            .await?;
        call.wait(self.request_timeout).await
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&self) -> McpResult<()> {
        self.inner.base.mark_started()?;
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| McpError::InvalidState("stream reader already consumed".into()))?;

        tracing::info!("Stream transport {} started", self.inner.id);
        tokio::spawn(self.inner.clone().read_loop(reader));
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        match self.inner.base.lifecycle() {
            Lifecycle::Started => self.inner.write_message(&message).await,
            Lifecycle::Created => Err(McpError::InvalidState("transport not started".into())),
            Lifecycle::Closed => Err(McpError::Closed),
        }
    }

    async fn close(&self) -> McpResult<()> {
        self.inner.shutdown().await;
        Ok(())
    }

    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.inner.base.set_message_handler(handler);
    }

    fn set_error_handler(&self, handler: ErrorHandler) {
        self.inner.base.set_error_handler(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        self.inner.base.set_close_handler(handler);
    }
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn read_loop<R>(self: Arc<Self>, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let mut frame = Vec::new();

        loop {
            frame.clear();
            let read = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                read = reader.read_until(b'\n', &mut frame) => read,
            };

            match read {
                Ok(0) => {
                    tracing::info!("EOF on stream {}, shutting down", self.id);
                    break;
                }
                Ok(_) => {
                    if framing::is_blank(&frame) {
                        continue;
                    }
                    self.handle_frame(&frame).await;
                }
                Err(e) => {
                    self.base.report_error(&McpError::Io(e));
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_frame(self: &Arc<Self>, frame: &[u8]) {
        match framing::parse_message(frame) {
            Ok(JsonRpcMessage::Request(request)) => self.spawn_request(request),
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(notification)
            }
            Ok(JsonRpcMessage::Response(response)) => {
                // Stray ids are reported by the engine itself.
                let _ = self.base.deliver(response);
            }
            Err(e) => {
                self.base.report_error(&e);
                if let McpError::Decode { id: Some(id), .. } = &e {
                    self.respond(e.to_response(id.clone())).await;
                }
            }
        }
    }

    fn spawn_request(self: &Arc<Self>, request: JsonRpcRequest) {
        let id = request.id.clone();

        let Some(handler) = self.base.message_handler() else {
            let err = McpError::NoMessageHandler;
            self.base.report_error(&err);
            let conn = self.clone();
            tokio::spawn(async move { conn.respond(err.to_response(id)).await });
            return;
        };

        let token = self.shutdown_token.child_token();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.contains_key(&id) {
                drop(in_flight);
                let err = McpError::DuplicateId(id.clone());
                self.base.report_error(&err);
                let conn = self.clone();
                tokio::spawn(async move { conn.respond(err.to_response(id)).await });
                return;
            }
            in_flight.insert(id.clone(), token.clone());
        }

        let conn = self.clone();
        tokio::spawn(async move {
            let ctx = RequestContext::new(id.clone(), token);
            let response = match run_request_isolated(handler, request, ctx).await {
                Ok(response) => response,
                Err(e) => {
                    conn.base.report_error(&e);
                    e.to_response(id.clone())
                }
            };
            conn.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);

            if conn.shutdown_token.is_cancelled() {
                tracing::debug!("Dropping response to {id}: stream closed");
                return;
            }
            conn.respond(response).await;
        });
    }

    fn handle_notification(self: &Arc<Self>, notification: JsonRpcNotification) {
        if notification.method == "notifications/cancelled" {
            self.cancel_in_flight(notification.params.clone());
        }

        let Some(handler) = self.base.message_handler() else {
            tracing::debug!("No handler for notification {}", notification.method);
            return;
        };
        let conn = self.clone();
        tokio::spawn(async move {
            if let Err(e) = run_notification_isolated(handler, notification).await {
                conn.base.report_error(&e);
            }
        });
    }

    fn cancel_in_flight(&self, params: Option<Value>) {
        let params: CancelledParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Malformed cancellation notification: {e}");
                return;
            }
        };

        let token = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&params.request_id)
            .cloned();
        match token {
            Some(token) => {
                tracing::info!(
                    "Cancelling request {}: {}",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason given")
                );
                token.cancel();
            }
            None => tracing::debug!("Cancellation for unknown request {}", params.request_id),
        }
    }

    async fn respond(&self, response: JsonRpcResponse) {
        if let Err(e) = self.write_message(&response.into()).await {
            self.base.report_error(&e);
        }
    }

    async fn write_message(&self, message: &JsonRpcMessage) -> McpResult<()> {
        let framed = framing::frame_message(message);
        let mut writer = self.writer.lock().await;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Idempotent. Cancels every in-flight request, fails pending
    /// outbound calls with `Closed`, and runs the close handler once.
    async fn shutdown(&self) {
        self.shutdown_token.cancel();
        if self.base.mark_closed() {
            if let Err(e) = self.writer.lock().await.shutdown().await {
                tracing::debug!("Error shutting down stream writer: {e}");
            }
            tracing::info!("Stream transport {} closed", self.id);
        }
    }
}
