//! Search tool handlers: grep and the unified multi-strategy search

use crate::context::ServerContext;
use crate::error::Result;
use crate::search::{self, GrepQuery};
use crate::server::result::ToolResult;
use crate::server::schema::{bool_or, optional_str, optional_u64, required_str};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Handle the `grep` tool.
pub async fn handle_grep(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let query = build_query(ctx, args, false)?;
    info!(pattern = %query.pattern, backend = search::detect_backend().name(), "content search");

    let output = search::grep(&query, &ctx.permissions).await?;
    if output.is_empty() {
        return Ok(ToolResult::text(format!(
            "No matches for '{}'",
            query.pattern
        )));
    }
    Ok(ToolResult::text(output))
}

/// Handle the `search` tool: filename, content, and git-history strategies
/// run concurrently and report as separate sections. Strategies that do not
/// apply (no git repository, search kind narrowed) are omitted silently.
pub async fn handle_search(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let kind = optional_str(args, "kind").unwrap_or("any").to_string();
    let query = build_query(ctx, args, true)?;
    let max_results = query.max_results;

    let want_filenames = kind == "any" || kind == "filename";
    let want_text = kind == "any" || kind == "text";

    let filename_task = async {
        if !want_filenames {
            return None;
        }
        let glob = format!("*{}*", query.pattern);
        search::find_names(&glob, &query.roots, "any", max_results, &ctx.permissions).ok()
    };

    let content_task = async {
        if !want_text {
            return None;
        }
        search::grep(&query, &ctx.permissions).await.ok()
    };

    let history_task = async {
        if !want_text {
            return Vec::new();
        }
        search::git_history(&query.pattern, &query.roots, max_results).await
    };

    let (filenames, content, history) = tokio::join!(filename_task, content_task, history_task);

    let mut sections = Vec::new();

    if let Some(files) = filenames {
        if !files.is_empty() {
            let listing: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
            sections.push(format!("=== Filename matches ===\n{}", listing.join("\n")));
        }
    }

    if let Some(content) = content {
        if !content.is_empty() {
            sections.push(format!("=== Content matches ===\n{}", content));
        }
    }

    if !history.is_empty() {
        sections.push(format!("=== History matches ===\n{}", history.join("\n")));
    }

    if sections.is_empty() {
        return Ok(ToolResult::text(format!(
            "No matches for '{}'",
            query.pattern
        )));
    }
    Ok(ToolResult::text(sections.join("\n\n")))
}

fn build_query(
    ctx: &ServerContext,
    args: &Map<String, Value>,
    unified: bool,
) -> Result<GrepQuery> {
    let pattern = required_str(args, "pattern")?.to_string();

    let roots = match optional_str(args, "path") {
        Some(path) => vec![ctx.permissions.check_path(Path::new(path))?],
        None => ctx.permissions.roots().to_vec(),
    };

    Ok(GrepQuery {
        pattern,
        roots,
        include: optional_str(args, "include").map(String::from),
        ignore_case: bool_or(args, "ignore_case", unified),
        line_numbers: bool_or(args, "line_numbers", true),
        context: optional_u64(args, "context").unwrap_or(0) as usize,
        max_results: optional_u64(args, "max_results").unwrap_or(if unified { 50 } else { 200 })
            as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context(dir: &TempDir) -> Arc<ServerContext> {
        ServerContext::new(ServerConfig::for_tests(vec![dir.path().to_path_buf()])).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_grep_finds_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("code.rs"), "let needle = 42;\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_grep(&ctx, &args(json!({"pattern": "needle"})))
            .await
            .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("needle"));
        assert!(text.contains("code.rs"));
    }

    #[tokio::test]
    async fn test_grep_no_match_is_success() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("code.rs"), "nothing\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_grep(&ctx, &args(json!({"pattern": "zzz_absent"})))
            .await
            .unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_grep_denied_path() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let err = handle_grep(
            &ctx,
            &args(json!({"pattern": "x", "path": "/etc"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("/etc"));
    }

    #[tokio::test]
    async fn test_unified_search_sections() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("needle_file.txt"), "plain body\n").unwrap();
        std::fs::write(dir.path().join("other.txt"), "has needle inside\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_search(&ctx, &args(json!({"pattern": "needle"})))
            .await
            .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("=== Filename matches ==="));
        assert!(text.contains("needle_file.txt"));
        assert!(text.contains("=== Content matches ==="));
        assert!(text.contains("other.txt"));
        // No git repository here, so no history section.
        assert!(!text.contains("=== History matches ==="));
    }

    #[tokio::test]
    async fn test_unified_search_filename_kind_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("needle_file.txt"), "has needle inside\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_search(
            &ctx,
            &args(json!({"pattern": "needle", "kind": "filename"})),
        )
        .await
        .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("=== Filename matches ==="));
        assert!(!text.contains("=== Content matches ==="));
    }
}
