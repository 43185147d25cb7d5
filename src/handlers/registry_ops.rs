//! Administrative tools over the registry: tool_list, tool_enable,
//! tool_disable

use crate::context::ServerContext;
use crate::error::Result;
use crate::server::result::ToolResult;
use crate::server::schema::required_str;
use serde_json::{json, Map, Value};
use tracing::info;

/// Handle the `tool_list` tool.
pub async fn handle_tool_list(
    ctx: &ServerContext,
    _args: &Map<String, Value>,
) -> Result<ToolResult> {
    let registry = ctx.registry.read().await;
    let listing: Vec<Value> = registry
        .all()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "category": tool.category.to_string(),
                "enabled": tool.enabled,
                "description": tool.description,
            })
        })
        .collect();

    Ok(ToolResult::json(&json!({
        "tools": listing,
        "count": listing.len()
    })))
}

/// Handle the `tool_enable` tool.
pub async fn handle_tool_enable(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let name = required_str(args, "name")?;
    ctx.registry.write().await.enable(name)?;
    info!(tool = name, "tool enabled");
    Ok(ToolResult::text(format!("Tool '{}' enabled", name)))
}

/// Handle the `tool_disable` tool.
pub async fn handle_tool_disable(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let name = required_str(args, "name")?;
    ctx.registry.write().await.disable(name)?;
    info!(tool = name, "tool disabled");
    Ok(ToolResult::text(format!("Tool '{}' disabled", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (TempDir, Arc<ServerContext>) {
        let dir = TempDir::new().unwrap();
        let ctx =
            ServerContext::new(ServerConfig::for_tests(vec![dir.path().to_path_buf()])).unwrap();
        (dir, ctx)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let (_dir, ctx) = context().await;

        handle_tool_disable(&ctx, &args(json!({"name": "grep"})))
            .await
            .unwrap();
        assert!(!ctx.registry.read().await.get("grep").unwrap().enabled);

        handle_tool_enable(&ctx, &args(json!({"name": "grep"})))
            .await
            .unwrap();
        assert!(ctx.registry.read().await.get("grep").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_admin_tools_stay_enabled() {
        let (_dir, ctx) = context().await;

        for name in ["tool_list", "tool_enable", "tool_disable"] {
            let err = handle_tool_disable(&ctx, &args(json!({"name": name})))
                .await
                .unwrap_err();
            assert!(err.to_string().contains(name));
        }

        let listing = handle_tool_list(&ctx, &Map::new()).await.unwrap();
        let text = listing.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        for tool in parsed["tools"].as_array().unwrap() {
            let name = tool["name"].as_str().unwrap();
            if ["tool_list", "tool_enable", "tool_disable"].contains(&name) {
                assert_eq!(tool["enabled"], true, "{name} must stay enabled");
            }
        }
    }

    #[tokio::test]
    async fn test_enable_unknown_tool() {
        let (_dir, ctx) = context().await;
        let err = handle_tool_enable(&ctx, &args(json!({"name": "bogus"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
