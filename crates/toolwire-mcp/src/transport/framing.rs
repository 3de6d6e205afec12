//! Message framing for newline-delimited JSON.

use crate::types::{JsonRpcMessage, McpResult};

/// Parse one raw frame as a JSON-RPC message. Invalid UTF-8 is a decode
/// error like any other malformed payload.
pub fn parse_message(frame: &[u8]) -> McpResult<JsonRpcMessage> {
    toolwire::decode(trim_frame(frame))
}

/// True for frames carrying nothing but whitespace.
pub fn is_blank(frame: &[u8]) -> bool {
    trim_frame(frame).is_empty()
}

/// Serialize a message to a JSON line (with trailing newline). Encoded
/// envelopes never contain a raw newline, so one line is one message.
pub fn frame_message(message: &JsonRpcMessage) -> Vec<u8> {
    let mut bytes = toolwire::encode(message);
    bytes.push(b'\n');
    bytes
}

fn trim_frame(frame: &[u8]) -> &[u8] {
    let start = frame
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(frame.len());
    let end = frame
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &frame[start..end]
}
