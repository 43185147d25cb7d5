//! Tool handlers
//!
//! Each handler is a free `async fn(ctx, args) -> Result<ToolResult>` over a
//! validated argument map. Dispatch is the match below; the registry decides
//! what is listed and callable.

pub mod agent_ops;
pub mod edit_ops;
pub mod fs_ops;
pub mod process_ops;
pub mod registry_ops;
pub mod search_ops;
pub mod shell_ops;
pub mod think_ops;

use crate::context::ServerContext;
use crate::error::{McpError, Result};
use crate::server::result::ToolResult;
use serde_json::{Map, Value};

/// Route a validated tool call to its handler.
pub async fn dispatch(
    ctx: &ServerContext,
    name: &str,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    match name {
        // Filesystem
        "read" => fs_ops::handle_read(ctx, args).await,
        "write" => fs_ops::handle_write(ctx, args).await,
        "list" => fs_ops::handle_list(ctx, args).await,
        "tree" => fs_ops::handle_tree(ctx, args).await,
        "find" => fs_ops::handle_find(ctx, args).await,
        "file_info" => fs_ops::handle_file_info(ctx, args).await,
        // Edit
        "edit" => edit_ops::handle_edit(ctx, args).await,
        "multi_edit" => edit_ops::handle_multi_edit(ctx, args).await,
        // Search
        "grep" => search_ops::handle_grep(ctx, args).await,
        "search" => search_ops::handle_search(ctx, args).await,
        // Shell
        "run_command" => shell_ops::handle_run_command(ctx, args).await,
        "run_script" => shell_ops::handle_run_script(ctx, args).await,
        // Background processes
        "run_background" => process_ops::handle_run_background(ctx, args).await,
        "list_processes" => process_ops::handle_list_processes(ctx, args).await,
        "get_process_output" => process_ops::handle_get_process_output(ctx, args).await,
        "kill_process" => process_ops::handle_kill_process(ctx, args).await,
        // Administration
        "tool_list" => registry_ops::handle_tool_list(ctx, args).await,
        "tool_enable" => registry_ops::handle_tool_enable(ctx, args).await,
        "tool_disable" => registry_ops::handle_tool_disable(ctx, args).await,
        // Agent
        "think" => think_ops::handle_think(ctx, args).await,
        "agent" => agent_ops::handle_agent(ctx, args).await,
        other => Err(McpError::NotFound(format!("no such tool: {}", other))),
    }
}
