//! Shell runner and background supervisor integration tests

use hanzo_mcp::server::handle_request;
use hanzo_mcp::protocol::RequestId;
use hanzo_mcp::{JsonRpcRequest, ServerConfig, ServerContext};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

async fn context(root: &Path) -> Arc<ServerContext> {
    ServerContext::new(ServerConfig::for_tests(vec![root.to_path_buf()])).unwrap()
}

async fn call(ctx: &ServerContext, id: i64, tool: &str, arguments: Value) -> Value {
    let request = JsonRpcRequest::new(
        RequestId::Number(id),
        "tools/call",
        Some(json!({"name": tool, "arguments": arguments})),
    );
    handle_request(ctx, request)
        .await
        .expect("tools/call is not a notification")
        .result
        .expect("tools/call always yields a result envelope")
}

fn text_of(result: &Value) -> String {
    result["content"][0]["text"].as_str().unwrap_or("").to_string()
}

#[tokio::test]
async fn test_background_process_lifecycle() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    let started = call(
        &ctx,
        1,
        "run_background",
        json!({"id": "s", "command": "echo hi; sleep 5"}),
    )
    .await;
    assert_eq!(started["isError"], false);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let output = call(&ctx, 2, "get_process_output", json!({"id": "s"})).await;
    assert_eq!(output["isError"], false);
    assert!(text_of(&output).contains("hi"));

    let killed = call(&ctx, 3, "kill_process", json!({"id": "s"})).await;
    assert_eq!(killed["isError"], false);

    let gone = call(&ctx, 4, "get_process_output", json!({"id": "s"})).await;
    assert_eq!(gone["isError"], true);
    assert!(text_of(&gone).contains("s"));
}

#[tokio::test]
async fn test_duplicate_background_id_conflicts() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    let first = call(
        &ctx,
        5,
        "run_background",
        json!({"id": "dup", "command": "sleep 10"}),
    )
    .await;
    assert_eq!(first["isError"], false);

    let second = call(
        &ctx,
        6,
        "run_background",
        json!({"id": "dup", "command": "sleep 10"}),
    )
    .await;
    assert_eq!(second["isError"], true);
    assert!(text_of(&second).contains("dup"));

    call(&ctx, 7, "kill_process", json!({"id": "dup"})).await;
}

#[tokio::test]
async fn test_shell_timeout_respects_cap_and_wall_clock() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    let start = Instant::now();
    let result = call(
        &ctx,
        8,
        "run_command",
        json!({"command": "sleep 10", "timeout": 200}),
    )
    .await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(result["isError"], true);
    assert!(text_of(&result).contains("200"));
}

#[tokio::test]
async fn test_shell_nonzero_exit_is_reported_as_data() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    let result = call(
        &ctx,
        9,
        "run_command",
        json!({"command": "echo out-line; echo err-line >&2; exit 3"}),
    )
    .await;

    assert_eq!(result["isError"], false);
    let text = text_of(&result);
    assert!(text.contains("Exit code: 3"));
    assert!(text.contains("out-line"));
    assert!(text.contains("err-line"));
}

#[tokio::test]
async fn test_run_script_executes_body() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    let result = call(
        &ctx,
        10,
        "run_script",
        json!({"script": "for i in 1 2 3; do echo line-$i; done\n", "interpreter": "sh"}),
    )
    .await;

    assert_eq!(result["isError"], false);
    let text = text_of(&result);
    assert!(text.contains("line-1"));
    assert!(text.contains("line-3"));
}

#[tokio::test]
async fn test_list_processes_reflects_running_state() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path()).await;

    call(
        &ctx,
        11,
        "run_background",
        json!({"id": "worker", "command": "sleep 10"}),
    )
    .await;

    let listing = call(&ctx, 12, "list_processes", json!({})).await;
    let text = text_of(&listing);
    assert!(text.contains("\"worker\""));
    assert!(text.contains("running"));

    call(&ctx, 13, "kill_process", json!({"id": "worker"})).await;

    let listing = call(&ctx, 14, "list_processes", json!({})).await;
    assert!(text_of(&listing).contains("No background processes"));
}
