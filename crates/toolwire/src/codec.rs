//! Envelope codec: raw bytes to typed messages and back.
//!
//! Decoding classifies an envelope by shape rather than trying each
//! variant in turn: `id`+`method` is a request, `method` alone is a
//! notification, `id` with exactly one of `result`/`error` is a response.
//! Anything else is rejected.

use serde_json::{Map, Value};

use crate::error::{McpError, McpResult};
use crate::message::{
    JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, ResponseOutcome, JSONRPC_VERSION,
};

/// Decode raw bytes into an envelope.
pub fn decode(bytes: &[u8]) -> McpResult<JsonRpcMessage> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(McpError::decode("Empty message"));
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| McpError::decode(e.to_string()))?;
    from_value(value)
}

/// Classify an already-parsed JSON value as an envelope.
pub fn from_value(value: Value) -> McpResult<JsonRpcMessage> {
    let Value::Object(mut obj) = value else {
        return Err(McpError::decode("Envelope must be a JSON object"));
    };

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => Some(parse_id(raw)?),
    };
    let fail = |reason: String| McpError::Decode {
        reason,
        id: id.clone(),
    };

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(fail(format!(
                "Expected jsonrpc version \"{JSONRPC_VERSION}\", got {other}"
            )))
        }
        None => return Err(fail("Missing \"jsonrpc\" field".to_string())),
    }

    let method = match obj.remove("method") {
        None => None,
        Some(Value::String(m)) if !m.is_empty() => Some(m),
        Some(Value::String(_)) => return Err(fail("Method name must not be empty".to_string())),
        Some(other) => return Err(fail(format!("Method must be a string, got {other}"))),
    };
    let result = obj.remove("result");
    let error = obj.remove("error");

    match (id.clone(), method, result, error) {
        (Some(id), Some(method), None, None) => Ok(JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params: take_params(&mut obj).map_err(fail)?,
        })),
        (None, Some(method), None, None) => {
            Ok(JsonRpcMessage::Notification(JsonRpcNotification {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method,
                params: take_params(&mut obj).map_err(fail)?,
            }))
        }
        (Some(id), None, Some(result), None) => Ok(JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: ResponseOutcome::Result(result),
        })),
        (Some(id), None, None, Some(error)) => {
            let error: JsonRpcErrorObject = serde_json::from_value(error)
                .map_err(|e| fail(format!("Malformed error object: {e}")))?;
            Ok(JsonRpcMessage::Response(JsonRpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                outcome: ResponseOutcome::Error(error),
            }))
        }
        (_, _, Some(_), Some(_)) => Err(fail(
            "Response must not carry both \"result\" and \"error\"".to_string(),
        )),
        _ => Err(fail("Cannot determine envelope kind".to_string())),
    }
}

fn parse_id(raw: Value) -> McpResult<RequestId> {
    match raw {
        Value::String(s) => Ok(RequestId::String(s)),
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| McpError::decode(format!("Request id must be an integer, got {n}"))),
        other => Err(McpError::decode(format!(
            "Request id must be an integer or string, got {other}"
        ))),
    }
}

fn take_params(obj: &mut Map<String, Value>) -> Result<Option<Value>, String> {
    match obj.remove("params") {
        None | Some(Value::Null) => Ok(None),
        Some(params @ (Value::Object(_) | Value::Array(_))) => Ok(Some(params)),
        Some(other) => Err(format!("Params must be an object or array, got {other}")),
    }
}

/// Encode an envelope to JSON bytes. Infallible for every envelope the
/// constructors in [`crate::message`] can build.
pub fn encode(message: &JsonRpcMessage) -> Vec<u8> {
    // Envelopes hold only string-keyed JSON, which always serializes.
    serde_json::to_vec(message).unwrap_or_else(|e| {
        tracing::error!("Failed to encode envelope: {e}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_json(value: Value) -> McpResult<JsonRpcMessage> {
        decode(value.to_string().as_bytes())
    }

    #[test]
    fn test_decode_request() {
        let msg = decode_json(json!({
            "jsonrpc": "2.0", "id": 7, "method": "time", "params": {"format": "%Y"}
        }))
        .unwrap();
        match msg {
            JsonRpcMessage::Request(req) => {
                assert_eq!(req.id, RequestId::Number(7));
                assert_eq!(req.method, "time");
                assert_eq!(req.params, Some(json!({"format": "%Y"})));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_notification_and_responses() {
        let notif = decode_json(json!({"jsonrpc": "2.0", "method": "initialized"})).unwrap();
        assert!(matches!(notif, JsonRpcMessage::Notification(_)));

        let ok = decode_json(json!({"jsonrpc": "2.0", "id": "a", "result": null})).unwrap();
        match ok {
            JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.result(), Some(&Value::Null));
            }
            other => panic!("expected response, got {other:?}"),
        }

        let err = decode_json(json!({
            "jsonrpc": "2.0", "id": 3, "error": {"code": -32601, "message": "nope"}
        }))
        .unwrap();
        match err {
            JsonRpcMessage::Response(resp) => {
                assert!(resp.is_error());
                assert_eq!(resp.error_object().unwrap().code, -32601);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_bytes() {
        assert!(matches!(
            decode(br#"{"broken":"#),
            Err(McpError::Decode { id: None, .. })
        ));
        assert!(decode(b"").is_err());
        assert!(decode(b"   \n").is_err());
        assert!(decode(b"[1,2,3]").is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_shapes() {
        // id only
        assert!(decode_json(json!({"jsonrpc": "2.0", "id": 1})).is_err());
        // both result and error
        let both = decode_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": 1, "error": {"code": 1, "message": "x"}
        }));
        assert!(both.is_err());
        // method plus result
        let mixed = json!({"jsonrpc": "2.0", "id": 1, "method": "m", "result": 1});
        assert!(decode_json(mixed).is_err());
        // bad id types
        assert!(decode_json(json!({"jsonrpc": "2.0", "id": null, "method": "m"})).is_err());
        assert!(decode_json(json!({"jsonrpc": "2.0", "id": 1.5, "method": "m"})).is_err());
        assert!(decode_json(json!({"jsonrpc": "2.0", "id": [1], "method": "m"})).is_err());
        // scalar params
        let scalar = json!({"jsonrpc": "2.0", "id": 1, "method": "m", "params": 3});
        assert!(decode_json(scalar).is_err());
    }

    #[test]
    fn test_decode_checks_version_and_recovers_id() {
        let err = decode_json(json!({"jsonrpc": "1.0", "id": 9, "method": "m"})).unwrap_err();
        match err {
            McpError::Decode { id, reason } => {
                assert_eq!(id, Some(RequestId::Number(9)));
                assert!(reason.contains("2.0"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }

        let missing = decode_json(json!({"id": "x", "method": "m"})).unwrap_err();
        assert!(matches!(missing, McpError::Decode { id: Some(_), .. }));
    }

    #[test]
    fn test_request_round_trip() {
        let requests = [
            JsonRpcRequest::new(1i64, "tools/call", Some(json!({"name": "time"}))),
            JsonRpcRequest::new("req-α", "ping", None),
            JsonRpcRequest::new(i64::MAX, "m", Some(json!([1, "two", {"three": 3}]))),
        ];
        for req in requests {
            let msg = JsonRpcMessage::Request(req);
            assert_eq!(decode(&encode(&msg)).unwrap(), msg);
        }
    }

    #[test]
    fn test_encode_error_response_shape() {
        let resp = JsonRpcResponse::error(RequestId::Number(1), -32601, "Method not found");
        let value: Value = serde_json::from_slice(&encode(&resp.into())).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not found"}
            })
        );
    }

    #[test]
    fn test_encode_result_and_notification_shape() {
        let resp = JsonRpcResponse::success(RequestId::String("a".into()), Value::Null);
        let value: Value = serde_json::from_slice(&encode(&resp.into())).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": "a", "result": null}));

        let notif = JsonRpcNotification::new("initialized", None);
        let value: Value = serde_json::from_slice(&encode(&notif.into())).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "initialized"}));
    }

    #[test]
    fn test_serde_deserialize_goes_through_codec() {
        let msg: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "note"})).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert!(serde_json::from_value::<JsonRpcMessage>(json!({"id": 1})).is_err());
    }
}
