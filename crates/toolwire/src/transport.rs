//! The capability set every transport variant provides.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::McpResult;
use crate::handler::{CloseHandler, ErrorHandler, MessageHandler};
use crate::message::JsonRpcMessage;

/// A channel that carries envelopes between a server and its callers.
///
/// Handlers may be bound before or after `start`; each slot is read under
/// the transport's lock, so a handler set from one task is seen by the
/// next message on any other.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin accepting messages.
    async fn start(&self) -> McpResult<()>;

    /// Write one outbound envelope.
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Stop accepting messages, fail outstanding calls, run the close
    /// handler. Idempotent.
    async fn close(&self) -> McpResult<()>;

    fn set_message_handler(&self, handler: Arc<dyn MessageHandler>);

    fn set_error_handler(&self, handler: ErrorHandler);

    fn set_close_handler(&self, handler: CloseHandler);
}
