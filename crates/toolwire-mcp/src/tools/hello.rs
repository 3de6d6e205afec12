//! Tool: hello — Greet the caller by name.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::types::{McpResult, ToolResponse};

use super::registry::Tool;

pub const NAME: &str = "hello";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HelloArgs {
    /// The name of the thing calling this tool (openai, google, claude, etc)
    pub submitter: String,
}

pub fn tool() -> McpResult<Tool> {
    Tool::typed(
        NAME,
        "Say hello to a person",
        |args: HelloArgs, _ctx| async move {
            Ok(ToolResponse::text(format!("Hello, {}!", args.submitter)))
        },
    )
}
