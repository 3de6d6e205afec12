//! Server — owns the tool registry and one transport's lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use toolwire::Transport;

use crate::config::ServerConfig;
use crate::protocol::ProtocolHandler;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{McpError, McpResult};

/// Binds a transport's message handler to registry dispatch.
pub struct Server {
    config: ServerConfig,
    registry: Arc<ToolRegistry>,
    transport: Arc<dyn Transport>,
    closed: CancellationToken,
}

impl Server {
    pub fn new(transport: Arc<dyn Transport>, config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ToolRegistry::new()),
            transport,
            closed: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Tools may be added before or while serving.
    pub fn register_tool(&self, tool: Tool) -> McpResult<()> {
        self.registry.register(tool)
    }

    /// Install the handlers and start the transport. Returns once the
    /// transport is accepting traffic; see [`Server::wait_closed`].
    pub async fn serve(&self) -> McpResult<()> {
        let handler = Arc::new(ProtocolHandler::new(
            self.registry.clone(),
            self.config.clone(),
        ));
        self.transport.set_message_handler(handler);
        self.transport.set_error_handler(Arc::new(|e: &McpError| {
            tracing::debug!("Server observed transport error: {e}");
        }));
        let closed = self.closed.clone();
        self.transport.set_close_handler(Arc::new(move || closed.cancel()));

        self.transport.start().await?;
        tracing::info!(
            "{} v{} serving {} tool(s)",
            self.config.name,
            self.config.version,
            self.registry.len()
        );
        Ok(())
    }

    pub async fn stop(&self) -> McpResult<()> {
        tracing::info!("Stopping {}", self.config.name);
        self.transport.close().await
    }

    /// Resolves once the transport has closed, from either side.
    pub async fn wait_closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
