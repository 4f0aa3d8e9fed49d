#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! End-to-end tests for the weather server: the full handshake and tool call over
//! an in-memory pipe, and the compiled binary driven through its real stdio.

use mock_weather_mcp::commands::{SERVER_NAME, build_server};
use mock_weather_mcp::mcp::{ConnectionState, MCP_VERSION, error_codes};
use mock_weather_mcp::weather::{FixedSource, ThreadRngSource};
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "bridge-test", "version": "0.0.1"}
        }
    })
}

fn call_temperature(id: i64, city: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "get_current_temperature",
            "arguments": {"city": city}
        }
    })
}

/// Send every message, close the input, and collect every reply line
async fn exchange<R, W>(mut to_server: W, from_server: R, messages: &[Value]) -> Vec<Value>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    for message in messages {
        to_server
            .write_all(format!("{}\n", message).as_bytes())
            .await
            .expect("write request");
    }
    to_server.shutdown().await.expect("close input");
    drop(to_server);

    let mut replies = Vec::new();
    let mut lines = BufReader::new(from_server).lines();
    while let Some(line) = lines.next_line().await.expect("read reply") {
        replies.push(serde_json::from_str(&line).expect("reply is JSON"));
    }
    replies
}

fn reply_text(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"]
        .as_str()
        .expect("reply carries text content")
}

/// Recover the temperature from a report for `city`
fn parse_temperature(city: &str, text: &str) -> Option<i64> {
    text.strip_prefix("The current temperature in ")?
        .strip_prefix(city)?
        .strip_prefix(" is ")?
        .strip_suffix("°C.")?
        .parse()
        .ok()
}

/// Full session over an in-memory pipe with a scripted temperature
#[tokio::test]
async fn in_memory_session_with_fixed_temperature() {
    let server = build_server(FixedSource(15)).await.expect("server builds");

    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let serve = tokio::spawn(Arc::clone(&server).serve(BufReader::new(server_read), server_write));

    let (client_read, client_write) = tokio::io::split(client_side);
    let replies = exchange(
        client_write,
        client_read,
        &[
            initialize_request(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            call_temperature(3, json!("Paris")),
            call_temperature(4, json!("")),
        ],
    )
    .await;

    serve.await.expect("serve task").expect("serve completes");

    assert_eq!(replies.len(), 4);

    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], SERVER_NAME);
    assert_eq!(replies[0]["result"]["protocolVersion"], MCP_VERSION);

    let tools = replies[1]["result"]["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "get_current_temperature");
    assert_eq!(
        tools[0]["description"],
        "Get current temperature for a location."
    );
    assert_eq!(tools[0]["inputSchema"]["properties"]["city"]["type"], "string");

    assert_eq!(replies[2]["id"], 3);
    assert_eq!(
        reply_text(&replies[2]),
        "The current temperature in Paris is 15°C."
    );
    assert_eq!(replies[2]["result"]["isError"], false);

    assert_eq!(
        reply_text(&replies[3]),
        "The current temperature in  is 15°C."
    );

    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

/// Malformed arguments are rejected by the runtime before the tool runs
#[tokio::test]
async fn in_memory_session_rejects_bad_arguments() {
    let server = build_server(ThreadRngSource).await.expect("server builds");

    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let serve = tokio::spawn(Arc::clone(&server).serve(BufReader::new(server_read), server_write));

    let (client_read, client_write) = tokio::io::split(client_side);
    let replies = exchange(
        client_write,
        client_read,
        &[
            call_temperature(1, json!(42)),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {"name": "get_current_temperature", "arguments": {}}
            }),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "get_forecast", "arguments": {"city": "Paris"}}
            }),
        ],
    )
    .await;

    serve.await.expect("serve task").expect("serve completes");

    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["error"]["code"], error_codes::INVALID_PARAMS);
    assert_eq!(replies[1]["error"]["code"], error_codes::INVALID_PARAMS);
    assert_eq!(replies[2]["error"]["code"], -32001);
}

/// Repeated calls all land in range; values are not required to repeat
#[tokio::test]
async fn in_memory_random_temperatures_stay_in_range() {
    let server = build_server(ThreadRngSource).await.expect("server builds");

    let (client_side, server_side) = tokio::io::duplex(1024 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let serve = tokio::spawn(Arc::clone(&server).serve(BufReader::new(server_read), server_write));

    let requests: Vec<Value> = (0..200).map(|id| call_temperature(id, json!("Oslo"))).collect();
    let (client_read, client_write) = tokio::io::split(client_side);
    let replies = exchange(client_write, client_read, &requests).await;

    serve.await.expect("serve task").expect("serve completes");

    assert_eq!(replies.len(), 200);
    for reply in &replies {
        let temperature =
            parse_temperature("Oslo", reply_text(reply)).expect("reply follows template");
        assert!((0..=30).contains(&temperature), "out of range: {}", temperature);
    }
}

/// The compiled binary speaks MCP over its stdin/stdout and exits on EOF
#[tokio::test]
async fn binary_serves_over_stdio() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mock-weather-mcp"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn server binary");

    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");

    let replies = exchange(
        stdin,
        stdout,
        &[
            initialize_request(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
            call_temperature(3, json!("Tokyo")),
        ],
    )
    .await;

    let status = child.wait().await.expect("server exits");
    assert!(status.success());

    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "weather");
    assert_eq!(replies[1], json!({"jsonrpc": "2.0", "id": 2, "result": {}}));

    let temperature =
        parse_temperature("Tokyo", reply_text(&replies[2])).expect("reply follows template");
    assert!((0..=30).contains(&temperature));
}
