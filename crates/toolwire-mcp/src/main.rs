//! toolwire-mcp — entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use toolwire_mcp::config::{self, ServerConfig};
use toolwire_mcp::tools::{builtin_tools, ToolRegistry};
use toolwire_mcp::types::InitializeResult;
use toolwire_mcp::Server;

#[derive(Parser)]
#[command(
    name = "toolwire-mcp",
    about = "MCP tool server — JSON-RPC tool calls over stdio or HTTP",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Timeout in milliseconds for requests the server sends to the client.
    /// Also reads from TOOLWIRE_REQUEST_TIMEOUT_MS.
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    #[cfg(feature = "stdio")]
    Serve,

    /// Start MCP server over HTTP.
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen address (host:port). Also reads from TOOLWIRE_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Bearer token for authentication.
        /// Also reads from TOOLWIRE_TOKEN env var.
        #[arg(long)]
        token: Option<String>,
    },

    /// Print server capabilities and tools as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   toolwire-mcp completions bash > ~/.local/share/bash-completion/completions/toolwire-mcp
    ///   toolwire-mcp completions zsh > ~/.zfunc/_toolwire-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let server_config = ServerConfig::default()
        .with_request_timeout(config::resolve_request_timeout(cli.request_timeout_ms)?);

    let Some(command) = cli.command else {
        #[cfg(feature = "stdio")]
        return serve_stdio(server_config).await;
        #[cfg(not(feature = "stdio"))]
        anyhow::bail!("no subcommand given and the stdio transport is not compiled in");
    };

    match command {
        #[cfg(feature = "stdio")]
        Commands::Serve => serve_stdio(server_config).await?,

        #[cfg(feature = "http")]
        Commands::ServeHttp { addr, token } => {
            use toolwire_mcp::transport::http;
            use toolwire_mcp::StatelessTransport;

            let addr = config::resolve_listen_addr(addr.as_deref());
            let token = config::resolve_token(token);
            if token.is_some() {
                tracing::info!("Auth: bearer token required");
            }

            let transport = Arc::new(StatelessTransport::new());
            let server = Server::new(transport.clone(), server_config);
            register_builtin_tools(&server)?;
            server.serve().await?;

            let shutdown = tokio_util::sync::CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, shutting down");
                }
                on_signal.cancel();
            });

            http::serve(&addr, transport, token, shutdown).await?;
            server.stop().await?;
        }

        Commands::Info => {
            let registry = ToolRegistry::new();
            for tool in builtin_tools()? {
                registry.register(tool)?;
            }
            let capabilities = InitializeResult::new(
                toolwire_mcp::types::Implementation {
                    name: server_config.name.clone(),
                    version: server_config.version.clone(),
                },
                server_config.instructions.clone(),
            );
            let tools = registry.list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "tools": tools,
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "toolwire-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(feature = "stdio")]
async fn serve_stdio(server_config: ServerConfig) -> anyhow::Result<()> {
    use toolwire_mcp::StdioTransport;

    let transport = Arc::new(
        StdioTransport::stdio().with_request_timeout(server_config.request_timeout),
    );
    let server = Server::new(transport, server_config);
    register_builtin_tools(&server)?;
    server.serve().await?;

    tokio::select! {
        _ = server.wait_closed() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            server.stop().await?;
        }
    }
    Ok(())
}

fn register_builtin_tools(server: &Server) -> anyhow::Result<()> {
    for tool in builtin_tools()? {
        server.register_tool(tool)?;
    }
    Ok(())
}
