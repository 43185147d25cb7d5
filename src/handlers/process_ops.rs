//! Background process tool handlers
//!
//! Thin layer over the supervisor: spawn named processes, list, tail
//! captured output, and terminate.

use crate::context::ServerContext;
use crate::error::Result;
use crate::server::result::ToolResult;
use crate::server::schema::{optional_str, optional_u64, required_str};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Handle the `run_background` tool.
pub async fn handle_run_background(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let id = required_str(args, "id")?;
    let command = required_str(args, "command")?;

    ctx.permissions.check_command(command)?;

    let cwd = match optional_str(args, "cwd") {
        Some(dir) => Some(ctx.permissions.check_path(Path::new(dir))?),
        None => None,
    };

    let pid = ctx.supervisor.spawn(id, command, cwd).await?;
    Ok(ToolResult::text(format!(
        "Started background process '{}' (pid {})",
        id, pid
    )))
}

/// Handle the `list_processes` tool.
pub async fn handle_list_processes(
    ctx: &ServerContext,
    _args: &Map<String, Value>,
) -> Result<ToolResult> {
    let snapshots = ctx.supervisor.list().await;
    if snapshots.is_empty() {
        return Ok(ToolResult::text("No background processes"));
    }

    let listing: Vec<Value> = snapshots
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "pid": p.pid,
                "command": p.command,
                "cwd": p.cwd.as_ref().map(|d| d.display().to_string()),
                "started_at": p.started_at.to_rfc3339(),
                "status": p.status.to_string(),
            })
        })
        .collect();
    Ok(ToolResult::json(&json!({
        "processes": listing,
        "count": listing.len()
    })))
}

/// Handle the `get_process_output` tool.
pub async fn handle_get_process_output(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let id = required_str(args, "id")?;
    let tail = optional_u64(args, "tail").unwrap_or(50) as usize;

    let output = ctx.supervisor.output(id, tail).await?;

    let mut parts = vec![format!("Status: {}", output.status)];
    if !output.stdout.is_empty() {
        let note = if output.stdout_discarded > 0 {
            format!(" ({} bytes discarded)", output.stdout_discarded)
        } else {
            String::new()
        };
        parts.push(format!("STDOUT{}:\n{}", note, output.stdout));
    }
    if !output.stderr.is_empty() {
        let note = if output.stderr_discarded > 0 {
            format!(" ({} bytes discarded)", output.stderr_discarded)
        } else {
            String::new()
        };
        parts.push(format!("STDERR{}:\n{}", note, output.stderr));
    }
    Ok(ToolResult::text(parts.join("\n\n")))
}

/// Handle the `kill_process` tool.
pub async fn handle_kill_process(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let id = required_str(args, "id")?;
    let status = ctx.supervisor.kill(id).await?;
    Ok(ToolResult::text(format!(
        "Process '{}' terminated (final status: {})",
        id, status
    )))
}
