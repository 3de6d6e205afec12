//! Persistent-stream transport exercised over an in-memory duplex pipe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};

use toolwire::Transport;
use toolwire_mcp::tools::{builtin_tools, Tool, ToolContext};
use toolwire_mcp::types::{error_codes, mcp_error_codes, McpError, ToolResponse};
use toolwire_mcp::{Server, ServerConfig, StreamTransport};

type ServerStream = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// The far end of the pipe, playing the MCP client.
struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, frame: &[u8]) {
        self.writer.write_all(frame).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("stream ended");
        serde_json::from_str(&line).unwrap()
    }

    async fn hang_up(&mut self) {
        self.writer.shutdown().await.unwrap();
    }
}

fn pipe(timeout: Duration) -> (Arc<ServerStream>, Client) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (client_read, client_write) = tokio::io::split(client);

    let transport =
        Arc::new(StreamTransport::new(server_read, server_write).with_request_timeout(timeout));
    let client = Client {
        lines: BufReader::new(client_read).lines(),
        writer: client_write,
    };
    (transport, client)
}

fn sleepy_tool() -> Tool {
    Tool::new(
        "sleep",
        "Sleeps for `ms` milliseconds",
        json!({
            "type": "object",
            "properties": { "ms": { "type": "integer" } },
            "required": ["ms"]
        }),
        |args, _ctx| async move {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolResponse::text(format!("slept {ms}")))
        },
    )
}

fn wait_for_cancel_tool() -> Tool {
    Tool::new(
        "wait",
        "Blocks until the call is cancelled",
        json!({"type": "object"}),
        |_, ctx: ToolContext| async move {
            ctx.cancelled().await;
            Ok(ToolResponse::text("stopped"))
        },
    )
}

async fn serving() -> (Arc<ServerStream>, Client, Server) {
    let (transport, client) = pipe(Duration::from_secs(5));
    let server = Server::new(transport.clone(), ServerConfig::default());
    for tool in builtin_tools()
        .unwrap()
        .into_iter()
        .chain([sleepy_tool(), wait_for_cancel_tool()])
    {
        server.register_tool(tool).unwrap();
    }
    server.serve().await.unwrap();
    (transport, client, server)
}

#[tokio::test]
async fn test_request_response_roundtrip() {
    let (_transport, mut client, _server) = serving().await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "hello", "arguments": { "submitter": "claude" } }
        }))
        .await;

    let resp = client.recv().await;
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"]["content"][0]["text"], "Hello, claude!");
}

#[tokio::test]
async fn test_slow_request_does_not_block_others() {
    let (_transport, mut client, _server) = serving().await;

    client
        .send(json!({"jsonrpc": "2.0", "id": "slow", "method": "sleep", "params": {"ms": 300}}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": "fast", "method": "ping"}))
        .await;

    assert_eq!(client.recv().await["id"], "fast");
    let slow = client.recv().await;
    assert_eq!(slow["id"], "slow");
    assert_eq!(slow["result"]["content"][0]["text"], "slept 300");
}

#[tokio::test]
async fn test_blank_and_malformed_lines() {
    let (_transport, mut client, _server) = serving().await;

    client.send_raw("").await;
    client.send_raw("   ").await;
    // No id can be recovered: nothing is written back.
    client.send_raw("{not json").await;
    // The id survives, so the failure is answered.
    client
        .send(json!({"jsonrpc": "1.0", "id": 5, "method": "ping"}))
        .await;

    let resp = client.recv().await;
    assert_eq!(resp["id"], 5);
    assert_eq!(resp["error"]["code"], error_codes::PARSE_ERROR);

    client.send(json!({"jsonrpc": "2.0", "id": 6, "method": "ping"})).await;
    let resp = client.recv().await;
    assert_eq!(resp["id"], 6);
    assert_eq!(resp["result"], json!({}));
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_connection_open() {
    let (transport, mut client, _server) = serving().await;

    client.send_bytes(b"\xff\xfe not utf8").await;
    client.send(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;

    let resp = client.recv().await;
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"], json!({}));
    assert_eq!(transport.lifecycle(), toolwire::Lifecycle::Started);
}

#[tokio::test]
async fn test_cancellation_notification_reaches_tool() {
    let (_transport, mut client, _server) = serving().await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 7, "method": "wait", "params": {}}))
        .await;
    // Give the request a moment to be registered as in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": { "requestId": 7, "reason": "user pressed stop" }
        }))
        .await;

    let resp = client.recv().await;
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["error"]["code"], mcp_error_codes::REQUEST_CANCELLED);
}

#[tokio::test]
async fn test_server_originated_request_is_correlated() {
    let (transport, mut client, _server) = serving().await;

    let outbound = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.request("roots/list", Some(json!({}))).await })
    };

    let request = client.recv().await;
    assert_eq!(request["method"], "roots/list");
    let id = request["id"].clone();
    client
        .send(json!({"jsonrpc": "2.0", "id": id, "result": {"roots": []}}))
        .await;

    let response = outbound.await.unwrap().unwrap();
    assert_eq!(response.result(), Some(&json!({"roots": []})));
    assert_eq!(transport.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_timeout_and_late_delivery() {
    let (transport, mut client) = pipe(Duration::from_millis(50));
    let stray = Arc::new(AtomicUsize::new(0));
    let seen = stray.clone();
    transport.set_error_handler(Arc::new(move |e: &McpError| {
        if matches!(e, McpError::NotFound(_)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));
    transport.start().await.unwrap();

    let err = transport.request("sampling/createMessage", None).await.unwrap_err();
    assert!(matches!(err, McpError::Timeout(_)));
    assert_eq!(transport.pending_requests(), 0);

    // Answer after the caller gave up.
    let request = client.recv().await;
    let id = request["id"].clone();
    client
        .send(json!({"jsonrpc": "2.0", "id": id, "result": {}}))
        .await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while stray.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("late response was never reported");
}

#[tokio::test]
async fn test_hang_up_closes_once_and_fails_pending() {
    let (transport, mut client) = pipe(Duration::from_secs(5));
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    transport.set_close_handler(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    transport.start().await.unwrap();

    let outbound = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.request("roots/list", None).await })
    };
    // The request is on the wire, so its entry exists.
    let _ = client.recv().await;
    client.hang_up().await;

    assert!(matches!(outbound.await.unwrap(), Err(McpError::Closed)));
    tokio::time::timeout(Duration::from_secs(5), transport.closed())
        .await
        .unwrap();

    transport.close().await.unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(transport.pending_requests(), 0);
}

#[tokio::test]
async fn test_server_sees_stream_close() {
    let (_transport, mut client, server) = serving().await;
    client.hang_up().await;
    tokio::time::timeout(Duration::from_secs(5), server.wait_closed())
        .await
        .unwrap();
    assert!(server.is_closed());
}
