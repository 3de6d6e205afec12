//! Tool registry and the built-in demo tools.

pub mod hello;
pub mod registry;
pub mod schema;
pub mod time;

pub use registry::{BoxError, Tool, ToolContext, ToolRegistry};

use crate::types::McpResult;

/// The demo tools the binary registers by default.
pub fn builtin_tools() -> McpResult<Vec<Tool>> {
    Ok(vec![time::tool()?, hello::tool()?])
}
