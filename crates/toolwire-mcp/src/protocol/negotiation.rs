//! MCP capability negotiation during initialization.

use crate::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, MCP_VERSION,
};

/// What the client told us during the handshake.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub client: ClientCapabilities,
    pub client_info: Option<Implementation>,
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    pub fn negotiate(
        &mut self,
        params: InitializeParams,
        server_info: Implementation,
        instructions: Option<String>,
    ) -> InitializeResult {
        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                "Client requested protocol version {}, server supports {}. \
                 Proceeding with server version.",
                params.protocol_version,
                MCP_VERSION
            );
        }

        tracing::info!(
            "Initialized with client: {} v{}",
            params.client_info.name,
            params.client_info.version
        );

        self.client = params.capabilities;
        self.client_info = Some(params.client_info);
        InitializeResult::new(server_info, instructions)
    }

    pub fn mark_initialized(&mut self) {
        if self.client_info.is_none() {
            tracing::warn!("initialized notification before initialize");
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
    }
}
