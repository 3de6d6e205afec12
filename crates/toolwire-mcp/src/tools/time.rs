//! Tool: time — Current time, optionally in a caller-supplied format.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::types::{McpResult, ToolResponse};

use super::registry::{BoxError, Tool};

pub const NAME: &str = "time";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TimeArgs {
    /// The time format to use (strftime syntax). Defaults to RFC 3339.
    #[serde(default)]
    pub format: Option<String>,
}

pub fn tool() -> McpResult<Tool> {
    Tool::typed(
        NAME,
        "Returns the current time in the specified format",
        |args: TimeArgs, _ctx| async move {
            format_time(Utc::now(), args.format.as_deref()).map(ToolResponse::text)
        },
    )
}

/// Render `now` with a strftime `format`, or as RFC 3339 when absent.
pub fn format_time(now: DateTime<Utc>, format: Option<&str>) -> Result<String, BoxError> {
    let Some(format) = format else {
        return Ok(now.to_rfc3339_opts(SecondsFormat::Secs, true));
    };

    let mut out = String::new();
    write!(out, "{}", now.format(format))
        .map_err(|_| format!("invalid time format {format:?}"))?;
    Ok(out)
}
