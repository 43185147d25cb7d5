//! Search backend detection and the built-in fallback engine
//!
//! Probes for `rg`, `ag`, then `ack` once per process; when none is present
//! the built-in engine walks the allowed roots with `ignore::WalkBuilder`
//! and scans with `regex`.

use crate::error::{McpError, Result};
use crate::permissions::PermissionManager;
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info};

/// External content-search backends in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Ripgrep,
    SilverSearcher,
    Ack,
    Builtin,
}

impl SearchBackend {
    pub fn name(&self) -> &'static str {
        match self {
            SearchBackend::Ripgrep => "rg",
            SearchBackend::SilverSearcher => "ag",
            SearchBackend::Ack => "ack",
            SearchBackend::Builtin => "builtin",
        }
    }
}

static BACKEND: OnceLock<SearchBackend> = OnceLock::new();

/// Detect the best available backend. Probed once and cached for the
/// process lifetime.
pub fn detect_backend() -> SearchBackend {
    *BACKEND.get_or_init(|| {
        for (binary, backend) in [
            ("rg", SearchBackend::Ripgrep),
            ("ag", SearchBackend::SilverSearcher),
            ("ack", SearchBackend::Ack),
        ] {
            if which::which(binary).is_ok() {
                info!(backend = binary, "search backend selected");
                return backend;
            }
        }
        info!("no external search backend found, using built-in engine");
        SearchBackend::Builtin
    })
}

/// A content-search request.
#[derive(Debug, Clone)]
pub struct GrepQuery {
    pub pattern: String,
    pub roots: Vec<PathBuf>,
    pub include: Option<String>,
    pub ignore_case: bool,
    pub line_numbers: bool,
    pub context: usize,
    pub max_results: usize,
}

/// Run a content search with the detected backend, falling back to the
/// built-in engine when the backend binary misbehaves.
pub async fn grep(query: &GrepQuery, permissions: &PermissionManager) -> Result<String> {
    match detect_backend() {
        SearchBackend::Builtin => builtin_grep(query, permissions),
        backend => match external_grep(backend, query).await {
            Ok(output) => Ok(output),
            Err(err) => {
                debug!(backend = backend.name(), error = %err, "backend failed, using built-in engine");
                builtin_grep(query, permissions)
            }
        },
    }
}

async fn external_grep(backend: SearchBackend, query: &GrepQuery) -> Result<String> {
    let mut cmd = match backend {
        SearchBackend::Ripgrep => {
            let mut cmd = Command::new("rg");
            if query.ignore_case {
                cmd.arg("--ignore-case");
            }
            if query.line_numbers {
                cmd.arg("--line-number");
            }
            if query.context > 0 {
                cmd.arg("-C").arg(query.context.to_string());
            }
            if let Some(ref glob) = query.include {
                cmd.arg("--glob").arg(glob);
            }
            cmd.arg("--max-count").arg(query.max_results.to_string());
            cmd
        }
        SearchBackend::SilverSearcher => {
            let mut cmd = Command::new("ag");
            if query.ignore_case {
                cmd.arg("--ignore-case");
            }
            if query.context > 0 {
                cmd.arg("-C").arg(query.context.to_string());
            }
            if let Some(ref glob) = query.include {
                cmd.arg("-G").arg(glob_to_regex(glob));
            }
            cmd
        }
        SearchBackend::Ack => {
            let mut cmd = Command::new("ack");
            if query.ignore_case {
                cmd.arg("--ignore-case");
            }
            if query.context > 0 {
                cmd.arg("-C").arg(query.context.to_string());
            }
            cmd
        }
        SearchBackend::Builtin => unreachable!("builtin handled by caller"),
    };

    cmd.arg("--").arg(&query.pattern);
    for root in &query.roots {
        cmd.arg(root);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| McpError::External(format!("{}: {}", backend.name(), e)))?;

    match output.status.code() {
        // 0 = matches found, 1 = no matches; both are clean outcomes.
        Some(0) | Some(1) => {
            let text = String::from_utf8_lossy(&output.stdout);
            Ok(truncate_lines(&text, query.max_results * (query.context * 2 + 1)))
        }
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(500).collect();
            Err(McpError::External(format!(
                "{} exited with {:?}: {}",
                backend.name(),
                output.status.code(),
                excerpt
            )))
        }
    }
}

/// Built-in engine: permission-aware walk + regex scan with context.
pub fn builtin_grep(query: &GrepQuery, permissions: &PermissionManager) -> Result<String> {
    let regex = RegexBuilder::new(&query.pattern)
        .case_insensitive(query.ignore_case)
        .build()
        .map_err(|e| McpError::Validation(format!("invalid pattern: {}", e)))?;

    let include = query
        .include
        .as_deref()
        .map(|glob| {
            Glob::new(glob)
                .map(|g| g.compile_matcher())
                .map_err(|e| McpError::Validation(format!("invalid include glob: {}", e)))
        })
        .transpose()?;

    let mut out = String::new();
    let mut hits = 0usize;

    'roots: for root in &query.roots {
        let walker = WalkBuilder::new(root).hidden(false).build();
        for entry in walker.flatten() {
            if hits >= query.max_results {
                break 'roots;
            }
            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if !permissions.is_path_allowed(path) {
                continue;
            }
            if let Some(ref matcher) = include {
                if !matches_glob(matcher, path) {
                    continue;
                }
            }

            let Ok(content) = std::fs::read_to_string(path) else {
                continue; // binary or unreadable
            };
            let lines: Vec<&str> = content.lines().collect();
            for (index, line) in lines.iter().enumerate() {
                if hits >= query.max_results {
                    break;
                }
                if regex.is_match(line) {
                    hits += 1;
                    append_match(&mut out, path, &lines, index, query);
                }
            }
        }
    }

    Ok(out)
}

fn matches_glob(matcher: &GlobMatcher, path: &Path) -> bool {
    matcher.is_match(path)
        || path
            .file_name()
            .map(|name| matcher.is_match(Path::new(name)))
            .unwrap_or(false)
}

fn append_match(out: &mut String, path: &Path, lines: &[&str], index: usize, query: &GrepQuery) {
    let start = index.saturating_sub(query.context);
    let end = (index + query.context + 1).min(lines.len());
    for (offset, line) in lines[start..end].iter().enumerate() {
        let lineno = start + offset + 1;
        let marker = if start + offset == index { ':' } else { '-' };
        if query.line_numbers {
            out.push_str(&format!("{}{}{}{}{}\n", path.display(), marker, lineno, marker, line));
        } else {
            out.push_str(&format!("{}{}{}\n", path.display(), marker, line));
        }
    }
}

/// Name matcher: glob when the pattern carries glob metacharacters,
/// case-insensitive substring otherwise.
struct NameMatcher {
    glob: Option<GlobMatcher>,
    needle: String,
}

impl NameMatcher {
    fn new(pattern: &str) -> Result<Self> {
        let glob = if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            Some(
                Glob::new(pattern)
                    .map_err(|e| McpError::Validation(format!("invalid pattern: {}", e)))?
                    .compile_matcher(),
            )
        } else {
            None
        };
        Ok(Self {
            glob,
            needle: pattern.to_lowercase(),
        })
    }

    fn matches(&self, name: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.is_match(Path::new(name)),
            None => name.to_lowercase().contains(&self.needle),
        }
    }
}

/// Find paths by name, preferring the backend's file lister over the
/// built-in walk when one is available.
pub async fn find_files(
    pattern: &str,
    roots: &[PathBuf],
    kind: &str,
    max_results: usize,
    permissions: &PermissionManager,
) -> Result<Vec<PathBuf>> {
    // `rg --files` only lists files, so directory queries always walk.
    if kind != "dir" && detect_backend() == SearchBackend::Ripgrep {
        if let Ok(paths) = rg_files(pattern, roots, max_results, permissions).await {
            return Ok(paths);
        }
    }
    find_names(pattern, roots, kind, max_results, permissions)
}

async fn rg_files(
    pattern: &str,
    roots: &[PathBuf],
    max_results: usize,
    permissions: &PermissionManager,
) -> Result<Vec<PathBuf>> {
    let matcher = NameMatcher::new(pattern)?;
    let mut results = Vec::new();

    for root in roots {
        if results.len() >= max_results {
            break;
        }
        let output = Command::new("rg")
            .arg("--files")
            .arg(root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| McpError::External(format!("rg: {}", e)))?;
        // Exit code 1 means nothing listable under this root.
        if !matches!(output.status.code(), Some(0) | Some(1)) {
            return Err(McpError::External(format!(
                "rg --files exited with {:?}",
                output.status.code()
            )));
        }
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if results.len() >= max_results {
                break;
            }
            let path = PathBuf::from(line);
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if matcher.matches(name) && permissions.is_path_allowed(&path) {
                results.push(path);
            }
        }
    }

    Ok(results)
}

/// Find paths whose names match a glob or substring pattern via the
/// built-in permission-aware walk.
pub fn find_names(
    pattern: &str,
    roots: &[PathBuf],
    kind: &str,
    max_results: usize,
    permissions: &PermissionManager,
) -> Result<Vec<PathBuf>> {
    let matcher = NameMatcher::new(pattern)?;

    let mut results = Vec::new();
    'roots: for root in roots {
        let walker = WalkBuilder::new(root).hidden(false).build();
        for entry in walker.flatten() {
            if results.len() >= max_results {
                break 'roots;
            }
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            match kind {
                "file" if is_dir => continue,
                "dir" if !is_dir => continue,
                _ => {}
            }
            if !permissions.is_path_allowed(path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if matcher.matches(name) {
                results.push(path.to_path_buf());
            }
        }
    }

    Ok(results)
}

/// `git log --all -S<pattern>` across any allowed roots that are git
/// repositories. Roots without a repository are skipped silently.
pub async fn git_history(pattern: &str, roots: &[PathBuf], max_results: usize) -> Vec<String> {
    let mut sections = Vec::new();
    if which::which("git").is_err() {
        return sections;
    }

    for root in roots {
        if !root.join(".git").exists() {
            continue;
        }
        let output = Command::new("git")
            .arg("log")
            .arg("--all")
            .arg("--oneline")
            .arg(format!("-S{}", pattern))
            .current_dir(root)
            .stdin(Stdio::null())
            .output()
            .await;

        if let Ok(output) = output {
            if output.status.success() {
                let text = String::from_utf8_lossy(&output.stdout);
                let truncated = truncate_lines(&text, max_results);
                if !truncated.is_empty() {
                    sections.push(format!("{}:\n{}", root.display(), truncated));
                }
            }
        }
    }

    sections
}

fn truncate_lines(text: &str, max_lines: usize) -> String {
    let mut lines = text.lines();
    let kept: Vec<&str> = lines.by_ref().take(max_lines).collect();
    let mut out = kept.join("\n");
    if lines.next().is_some() {
        out.push_str("\n... (truncated)");
    }
    out
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::new();
    for c in glob.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' => regex.push_str("\\."),
            other => regex.push(other),
        }
    }
    regex
}
