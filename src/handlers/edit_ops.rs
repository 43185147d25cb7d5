//! Edit engine: uniqueness-checked single edits and atomic multi-edit batches
//!
//! Matches are literal — whitespace and newlines significant, no regex
//! interpretation. When `replace_all` is off, `old_text` must occur exactly
//! once; zero or many matches fail without touching the file. A multi-edit
//! batch applies in order against the running content and aborts whole.

use crate::context::ServerContext;
use crate::error::{McpError, Result};
use crate::handlers::fs_ops::{decode, is_binary, write_atomic};
use crate::server::result::ToolResult;
use crate::server::schema::{bool_or, required_str};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// One edit operation.
#[derive(Debug, Clone)]
pub struct EditOp {
    pub old_text: String,
    pub new_text: String,
    pub replace_all: bool,
}

impl EditOp {
    fn from_value(value: &Value, index: usize) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            McpError::Validation(format!("edits[{}] must be an object", index))
        })?;
        let old_text = obj
            .get("old_text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McpError::Validation(format!("edits[{}] is missing old_text", index))
            })?
            .to_string();
        let new_text = obj
            .get("new_text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McpError::Validation(format!("edits[{}] is missing new_text", index))
            })?
            .to_string();
        let replace_all = obj
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            old_text,
            new_text,
            replace_all,
        })
    }
}

/// Apply one edit to `content`, returning the new content and the number of
/// replacements made.
fn apply_edit(content: &str, edit: &EditOp) -> Result<(String, usize)> {
    if edit.old_text.is_empty() {
        return Err(McpError::Validation(
            "old_text must not be empty".to_string(),
        ));
    }

    let count = content.matches(&edit.old_text).count();

    if edit.replace_all {
        // Zero replacements is an error too: the caller asked to change
        // something that is not there.
        if count == 0 {
            return Err(McpError::NotFound(format!(
                "old_text not found (replace_all makes zero replacements an error): {:?}",
                excerpt(&edit.old_text)
            )));
        }
        return Ok((content.replace(&edit.old_text, &edit.new_text), count));
    }

    match count {
        0 => Err(McpError::NotFound(format!(
            "old_text not found: {:?}",
            excerpt(&edit.old_text)
        ))),
        1 => Ok((content.replacen(&edit.old_text, &edit.new_text, 1), 1)),
        n => Err(McpError::Conflict(format!(
            "old_text is ambiguous ({} matches); add more surrounding context",
            n
        ))),
    }
}

/// Handle the `edit` tool.
pub async fn handle_edit(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let edit = EditOp {
        old_text: required_str(args, "old_text")?.to_string(),
        new_text: required_str(args, "new_text")?.to_string(),
        replace_all: bool_or(args, "replace_all", false),
    };

    let canon = ctx.permissions.check_write(Path::new(path))?;
    let content = read_text(&canon, path).await?;

    let (next, count) = apply_edit(&content, &edit)?;
    write_atomic(&canon, next.as_bytes()).await?;

    info!(path = path, replacements = count, "edited file");
    Ok(ToolResult::text(format!(
        "Replaced {} occurrence{} in {}",
        count,
        if count == 1 { "" } else { "s" },
        path
    )))
}

/// Handle the `multi_edit` tool.
pub async fn handle_multi_edit(
    ctx: &ServerContext,
    args: &Map<String, Value>,
) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let edits_value = args
        .get("edits")
        .and_then(Value::as_array)
        .ok_or_else(|| McpError::Validation("missing required parameter: edits".to_string()))?;

    if edits_value.is_empty() {
        return Err(McpError::Validation("edits must not be empty".to_string()));
    }

    let mut edits = Vec::with_capacity(edits_value.len());
    for (index, value) in edits_value.iter().enumerate() {
        edits.push(EditOp::from_value(value, index)?);
    }

    let canon = ctx.permissions.check_write(Path::new(path))?;
    let content = read_text(&canon, path).await?;

    // Apply the whole batch in memory; only a fully successful batch is
    // written, so other readers see all edits or none.
    let mut running = content;
    let mut total = 0usize;
    for (index, edit) in edits.iter().enumerate() {
        let (next, count) = apply_edit(&running, edit).map_err(|e| match e {
            McpError::NotFound(msg) => McpError::NotFound(format!("edit {}: {}", index, msg)),
            McpError::Conflict(msg) => McpError::Conflict(format!("edit {}: {}", index, msg)),
            other => other,
        })?;
        running = next;
        total += count;
    }

    write_atomic(&canon, running.as_bytes()).await?;

    info!(path = path, edits = edits.len(), replacements = total, "applied edit batch");
    Ok(ToolResult::text(format!(
        "Applied {} edit{} ({} replacement{}) to {}",
        edits.len(),
        if edits.len() == 1 { "" } else { "s" },
        total,
        if total == 1 { "" } else { "s" },
        path
    )))
}

async fn read_text(canon: &Path, display: &str) -> Result<String> {
    let bytes = tokio::fs::read(canon).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            McpError::NotFound(format!("file not found: {}", display))
        }
        _ => McpError::Io(e),
    })?;
    if is_binary(&bytes) {
        return Err(McpError::Validation(format!(
            "{} is a binary file and cannot be edited",
            display
        )));
    }
    Ok(decode(&bytes).0)
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
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
    async fn test_unique_edit_succeeds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "world",
                "new_text": "there"
            })),
        )
        .await
        .unwrap();

        assert!(!result.is_error);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello there\n");
    }

    #[tokio::test]
    async fn test_ambiguous_edit_fails_without_modification() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.txt");
        std::fs::write(&file, "foo foo\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "foo",
                "new_text": "bar"
            })),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains('2'));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "foo foo\n");
    }

    #[tokio::test]
    async fn test_missing_old_text_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("c.txt");
        std::fs::write(&file, "content\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "absent",
                "new_text": "x"
            })),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, McpError::NotFound(_)));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "content\n");
    }

    #[tokio::test]
    async fn test_replace_all() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("d.txt");
        std::fs::write(&file, "x x x\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "x",
                "new_text": "y",
                "replace_all": true
            })),
        )
        .await
        .unwrap();

        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains('3'));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "y y y\n");
    }

    #[tokio::test]
    async fn test_replace_all_zero_matches_is_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("e.txt");
        std::fs::write(&file, "nothing here\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "absent",
                "new_text": "x",
                "replace_all": true
            })),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("zero replacements"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "nothing here\n");
    }

    #[tokio::test]
    async fn test_empty_old_text_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "content\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "",
                "new_text": "x"
            })),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_multi_edit_applies_in_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("g.txt");
        std::fs::write(&file, "alpha beta\n").unwrap();
        let ctx = context(&dir).await;

        handle_multi_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "edits": [
                    {"old_text": "alpha", "new_text": "gamma"},
                    {"old_text": "gamma beta", "new_text": "done"}
                ]
            })),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "done\n");
    }

    #[tokio::test]
    async fn test_multi_edit_aborts_whole_batch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("h.txt");
        std::fs::write(&file, "alpha beta\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_multi_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "edits": [
                    {"old_text": "alpha", "new_text": "gamma"},
                    {"old_text": "missing", "new_text": "x"}
                ]
            })),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("edit 1"));
        // First edit must not have leaked through.
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "alpha beta\n");
    }

    #[tokio::test]
    async fn test_whitespace_is_significant() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.txt");
        std::fs::write(&file, "a  b\n").unwrap();
        let ctx = context(&dir).await;

        let err = handle_edit(
            &ctx,
            &args(json!({
                "path": file.to_str().unwrap(),
                "old_text": "a b",
                "new_text": "c"
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::NotFound(_)));
    }
}
