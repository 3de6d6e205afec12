//! Configuration loading and resolution.
//!
//! Precedence everywhere: explicit value (CLI flag) > environment > default.

use std::time::Duration;

pub const ENV_ADDR: &str = "TOOLWIRE_ADDR";
pub const ENV_TOKEN: &str = "TOOLWIRE_TOKEN";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TOOLWIRE_REQUEST_TIMEOUT_MS";

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Identity and limits of one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
    /// How long a server-originated request waits for its response.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Resolve the HTTP listen address.
pub fn resolve_listen_addr(explicit: Option<&str>) -> String {
    resolve_listen_addr_from(explicit, env_lookup)
}

/// Resolve the bearer token required on `/mcp`, if any.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    resolve_token_from(explicit, env_lookup)
}

/// Resolve the outbound request timeout.
pub fn resolve_request_timeout(explicit_ms: Option<u64>) -> Result<Duration, ConfigError> {
    resolve_request_timeout_from(explicit_ms, env_lookup)
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_listen_addr_from(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }
    env(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

fn resolve_token_from(
    explicit: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit.or_else(|| env(ENV_TOKEN))
}

fn resolve_request_timeout_from(
    explicit_ms: Option<u64>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Duration, ConfigError> {
    if let Some(ms) = explicit_ms {
        return Ok(Duration::from_millis(ms));
    }
    match env(ENV_REQUEST_TIMEOUT_MS) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidEnv {
                var: ENV_REQUEST_TIMEOUT_MS,
                value: raw,
                reason: e.to_string(),
            }),
        None => Ok(DEFAULT_REQUEST_TIMEOUT),
    }
}
