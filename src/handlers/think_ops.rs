//! The think tool: record a thought, change nothing

use crate::context::ServerContext;
use crate::error::Result;
use crate::server::result::ToolResult;
use crate::server::schema::required_str;
use serde_json::{Map, Value};
use tracing::debug;

/// Handle the `think` tool.
pub async fn handle_think(_ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let thought = required_str(args, "thought")?;
    debug!(chars = thought.len(), "thought recorded");
    Ok(ToolResult::text(
        "Thought recorded. No action was taken.",
    ))
}
