//! Filesystem tool handlers: read, write, list, tree, find, file_info

use crate::context::ServerContext;
use crate::error::{McpError, Result};
use crate::server::schema::{bool_or, optional_str, optional_u64, required_str};
use crate::server::result::ToolResult;
use globset::Glob;
use serde_json::{json, Map, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Bytes examined for binary detection.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Default page size for read when no limit is given.
const DEFAULT_READ_LIMIT: usize = 2000;

/// Directories filtered out of `tree` output unless `include_filtered`.
const FILTERED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "dist",
    "build",
    "target",
    ".cache",
    ".pytest_cache",
    ".mypy_cache",
];

/// Handle the `read` tool.
pub async fn handle_read(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let offset = optional_u64(args, "offset").unwrap_or(0) as usize;
    let limit = optional_u64(args, "limit").map(|v| v as usize);

    let canon = ctx.permissions.check_path(Path::new(path))?;

    let bytes = tokio::fs::read(&canon)
        .await
        .map_err(|e| read_error(path, e))?;

    if is_binary(&bytes) {
        let size = bytes.len();
        return Ok(ToolResult::text(format!(
            "{} is a binary file ({} bytes); contents not shown",
            path, size
        )));
    }

    let (text, encoding) = decode(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let limit = limit.unwrap_or(DEFAULT_READ_LIMIT);
    let end = (offset + limit).min(total);
    let page = if offset >= total {
        String::new()
    } else {
        lines[offset..end].join("\n")
    };
    let has_more = end < total;

    info!(path = path, offset = offset, lines = end.saturating_sub(offset), "read file");

    let mut result = ToolResult::text(page);
    result.push_text(format!(
        "[lines {}-{} of {}; encoding {}{}]",
        offset,
        end,
        total,
        encoding,
        if has_more { "; more content follows" } else { "" }
    ));
    Ok(result)
}

/// Handle the `write` tool.
pub async fn handle_write(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let content = required_str(args, "content")?;

    let canon = ctx.permissions.check_write(Path::new(path))?;

    if let Some(parent) = canon.parent() {
        if !parent.exists() {
            // Every created component was already judged by check_write via
            // the deepest-existing-ancestor rule.
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    write_atomic(&canon, content.as_bytes()).await?;

    info!(path = path, bytes = content.len(), "wrote file");
    Ok(ToolResult::text(format!(
        "Wrote {} bytes to {}",
        content.len(),
        path
    )))
}

/// Handle the `list` tool.
pub async fn handle_list(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let pattern = optional_str(args, "pattern");

    let canon = ctx.permissions.check_path(Path::new(path))?;
    if !canon.is_dir() {
        return Err(McpError::NotFound(format!("{} is not a directory", path)));
    }

    let matcher = pattern
        .map(|p| {
            Glob::new(p)
                .map(|g| g.compile_matcher())
                .map_err(|e| McpError::Validation(format!("invalid pattern: {}", e)))
        })
        .transpose()?;

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(&canon).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(ref matcher) = matcher {
            if !matcher.is_match(Path::new(&name)) {
                continue;
            }
        }
        let kind = match entry.file_type().await {
            Ok(t) if t.is_dir() => "dir",
            Ok(t) if t.is_symlink() => "link",
            _ => "file",
        };
        entries.push((name, kind));
    }
    entries.sort();

    let listing: Vec<String> = entries
        .iter()
        .map(|(name, kind)| format!("[{}] {}", kind, name))
        .collect();
    Ok(ToolResult::text(listing.join("\n")))
}

/// Handle the `tree` tool.
pub async fn handle_tree(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let depth = optional_u64(args, "depth").unwrap_or(3) as usize;
    let show_hidden = bool_or(args, "show_hidden", false);
    let dirs_only = bool_or(args, "dirs_only", false);
    let show_size = bool_or(args, "show_size", false);
    let include_filtered = bool_or(args, "include_filtered", false);
    let pattern = optional_str(args, "pattern");

    let canon = ctx.permissions.check_path(Path::new(path))?;
    if !canon.is_dir() {
        return Err(McpError::NotFound(format!("{} is not a directory", path)));
    }

    let matcher = pattern
        .map(|p| {
            Glob::new(p)
                .map(|g| g.compile_matcher())
                .map_err(|e| McpError::Validation(format!("invalid pattern: {}", e)))
        })
        .transpose()?;

    let options = TreeOptions {
        show_hidden,
        dirs_only,
        show_size,
        include_filtered,
        matcher,
    };

    let mut out = format!("{}\n", path);
    render_tree(&canon, "", depth, &options, &mut out)?;
    Ok(ToolResult::text(out))
}

struct TreeOptions {
    show_hidden: bool,
    dirs_only: bool,
    show_size: bool,
    include_filtered: bool,
    matcher: Option<globset::GlobMatcher>,
}

fn render_tree(
    dir: &Path,
    prefix: &str,
    depth: usize,
    options: &TreeOptions,
    out: &mut String,
) -> Result<()> {
    if depth == 0 {
        return Ok(());
    }

    let mut entries: Vec<(String, PathBuf, bool, u64)> = std::fs::read_dir(dir)?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().ok()?;
            Some((name, entry.path(), meta.is_dir(), meta.len()))
        })
        .filter(|(name, _, is_dir, _)| {
            if !options.show_hidden && name.starts_with('.') {
                return false;
            }
            if !options.include_filtered && *is_dir && FILTERED_DIRS.contains(&name.as_str()) {
                return false;
            }
            if options.dirs_only && !is_dir {
                return false;
            }
            if let Some(ref matcher) = options.matcher {
                if !is_dir && !matcher.is_match(Path::new(name)) {
                    return false;
                }
            }
            true
        })
        .collect();
    entries.sort_by(|a, b| (b.2, &a.0).cmp(&(a.2, &b.0)));

    let count = entries.len();
    for (index, (name, path, is_dir, size)) in entries.into_iter().enumerate() {
        let last = index + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let size_note = if options.show_size && !is_dir {
            format!(" ({} bytes)", size)
        } else {
            String::new()
        };
        let slash = if is_dir { "/" } else { "" };
        out.push_str(&format!("{}{}{}{}{}\n", prefix, connector, name, slash, size_note));

        if is_dir {
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            render_tree(&path, &child_prefix, depth - 1, options, out)?;
        }
    }

    Ok(())
}

/// Handle the `find` tool.
pub async fn handle_find(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let pattern = required_str(args, "pattern")?;
    let kind = optional_str(args, "kind").unwrap_or("any");
    let max_results = optional_u64(args, "max_results").unwrap_or(200) as usize;

    let roots = match optional_str(args, "path") {
        Some(path) => vec![ctx.permissions.check_path(Path::new(path))?],
        None => ctx.permissions.roots().to_vec(),
    };

    let results =
        crate::search::find_files(pattern, &roots, kind, max_results, &ctx.permissions).await?;

    if results.is_empty() {
        return Ok(ToolResult::text(format!("No matches for '{}'", pattern)));
    }

    let listing: Vec<String> = results
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    Ok(ToolResult::text(listing.join("\n")))
}

/// Handle the `file_info` tool.
pub async fn handle_file_info(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let path = required_str(args, "path")?;
    let path_ref = Path::new(path);
    ctx.permissions.check_path(path_ref)?;

    // The permission check canonicalizes through the final symlink; stat the
    // un-followed leaf so a symlink reports itself, not its target.
    let stat_path = match (path_ref.parent(), path_ref.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| path_ref.to_path_buf()),
        _ => path_ref.to_path_buf(),
    };

    let meta = tokio::fs::symlink_metadata(&stat_path)
        .await
        .map_err(|e| read_error(path, e))?;

    let kind = if meta.is_dir() {
        "directory"
    } else if meta.file_type().is_symlink() {
        "symlink"
    } else {
        "file"
    };

    let mtime = meta
        .modified()
        .ok()
        .map(chrono::DateTime::<chrono::Utc>::from)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let mut info = json!({
        "path": stat_path.display().to_string(),
        "kind": kind,
        "size": meta.len(),
        "mode": format!("{:o}", meta.permissions().mode() & 0o7777),
        "modified": mtime,
    });

    if meta.file_type().is_symlink() {
        if let Ok(target) = tokio::fs::read_link(&stat_path).await {
            info["symlink_target"] = json!(target.display().to_string());
        }
    }

    Ok(ToolResult::json(&info))
}

/// Write content atomically: temp file in the target directory, then rename.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| McpError::Internal(format!("no parent for {}", path.display())))?
        .to_path_buf();
    let target = path.to_path_buf();
    let content = content.to_vec();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut temp, &content)?;
        temp.persist(&target)
            .map_err(|e| McpError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| McpError::Internal(format!("write task failed: {}", e)))?
}

/// NUL byte within the first 8 KiB marks a file as binary.
pub fn is_binary(bytes: &[u8]) -> bool {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    // UTF-16 text carries NULs in the BOM-marked case; let decode handle it.
    if sniff.starts_with(&[0xFF, 0xFE]) || sniff.starts_with(&[0xFE, 0xFF]) {
        return false;
    }
    sniff.contains(&0)
}

/// Decode file bytes: UTF-16 via BOM, then UTF-8, then Latin-1.
pub fn decode(bytes: &[u8]) -> (String, &'static str) {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return (decode_utf16(&bytes[2..], true), "utf-16le");
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return (decode_utf16(&bytes[2..], false), "utf-16be");
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.strip_prefix('\u{feff}').unwrap_or(text);
            (text.to_string(), "utf-8")
        }
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), "latin-1"),
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn read_error(path: &str, err: std::io::Error) -> McpError {
    match err.kind() {
        std::io::ErrorKind::NotFound => McpError::NotFound(format!("file not found: {}", path)),
        _ => McpError::Io(err),
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
    async fn test_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "line one\nline two\n").unwrap();
        let ctx = context(&dir).await;

        let result = handle_read(
            &ctx,
            &args(json!({"path": dir.path().join("a.txt").to_str().unwrap()})),
        )
        .await
        .unwrap();

        let value = result.to_value();
        assert_eq!(value["isError"], false);
        let text = value["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("line one"));
    }

    #[tokio::test]
    async fn test_read_pagination_reports_more() {
        let dir = TempDir::new().unwrap();
        let body: String = (0..10).map(|i| format!("l{}\n", i)).collect();
        std::fs::write(dir.path().join("a.txt"), body).unwrap();
        let ctx = context(&dir).await;

        let result = handle_read(
            &ctx,
            &args(json!({
                "path": dir.path().join("a.txt").to_str().unwrap(),
                "offset": 2,
                "limit": 3
            })),
        )
        .await
        .unwrap();

        let value = result.to_value();
        let page = value["content"][0]["text"].as_str().unwrap();
        assert_eq!(page, "l2\nl3\nl4");
        let note = value["content"][1]["text"].as_str().unwrap();
        assert!(note.contains("more content follows"));
    }

    #[tokio::test]
    async fn test_read_binary_placeholder() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
        let ctx = context(&dir).await;

        let result = handle_read(
            &ctx,
            &args(json!({"path": dir.path().join("blob.bin").to_str().unwrap()})),
        )
        .await
        .unwrap();

        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("binary"));
    }

    #[tokio::test]
    async fn test_read_outside_roots_denied() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let err = handle_read(&ctx, &args(json!({"path": "/etc/passwd"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let target = dir.path().join("new/deep/file.txt");

        handle_write(
            &ctx,
            &args(json!({
                "path": target.to_str().unwrap(),
                "content": "hello"
            })),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_outside_roots_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let target = outside.path().join("forbidden.txt");

        let err = handle_write(
            &ctx,
            &args(json!({
                "path": target.to_str().unwrap(),
                "content": "nope"
            })),
        )
        .await
        .unwrap_err();

        assert!(err.is_tool_error());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_list_with_glob() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = context(&dir).await;

        let result = handle_list(
            &ctx,
            &args(json!({
                "path": dir.path().to_str().unwrap(),
                "pattern": "*.rs"
            })),
        )
        .await
        .unwrap();

        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("[file] a.rs"));
        assert!(!text.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_tree_filters_noise_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        let ctx = context(&dir).await;

        let result = handle_tree(
            &ctx,
            &args(json!({"path": dir.path().to_str().unwrap()})),
        )
        .await
        .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("├── src/") || text.contains("└── src/"));
        assert!(text.contains("lib.rs"));
        assert!(!text.contains("node_modules"));

        let result = handle_tree(
            &ctx,
            &args(json!({
                "path": dir.path().to_str().unwrap(),
                "include_filtered": true
            })),
        )
        .await
        .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("node_modules"));
    }

    #[tokio::test]
    async fn test_file_info_symlink_target() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("real.txt"), "data").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();
        let ctx = context(&dir).await;

        let result = handle_file_info(
            &ctx,
            &args(json!({"path": dir.path().join("link.txt").to_str().unwrap()})),
        )
        .await
        .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("\"kind\": \"symlink\""));
        assert!(text.contains("\"symlink_target\""));
        assert!(text.contains("real.txt"));

        let result = handle_file_info(
            &ctx,
            &args(json!({"path": dir.path().join("real.txt").to_str().unwrap()})),
        )
        .await
        .unwrap();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("\"kind\": \"file\""));
        assert!(text.contains("\"size\": 4"));
    }

    #[test]
    fn test_decode_utf16le() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "héllo".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, encoding) = decode(&bytes);
        assert_eq!(text, "héllo");
        assert_eq!(encoding, "utf-16le");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let bytes = vec![b'c', b'a', b'f', 0xE9]; // "café" in Latin-1
        let (text, encoding) = decode(&bytes);
        assert_eq!(text, "café");
        assert_eq!(encoding, "latin-1");
    }

    #[test]
    fn test_is_binary() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary(b"plain text"));
        assert!(!is_binary(&[0xFF, 0xFE, 0x68, 0x00])); // UTF-16LE BOM
    }
}
