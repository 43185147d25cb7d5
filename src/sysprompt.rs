//! System prompt assembly
//!
//! Builds the text document served at `hanzo://system-prompt`: environment,
//! git state, detected project types, and the enabled tool inventory. Pure
//! over the current filesystem and registry state; re-evaluated on each
//! read.

use crate::context::ServerContext;
use chrono::Utc;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Stable URI the prompt is exposed under.
pub const SYSTEM_PROMPT_URI: &str = "hanzo://system-prompt";

/// Manifest files used to sniff the project type.
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("Gemfile", "ruby"),
    ("Makefile", "make"),
    ("CMakeLists.txt", "cmake"),
];

const USAGE_GUIDANCE: &str = "\
Usage guidance:
- Prefer read/grep/tree for exploration before making changes.
- edit requires old_text to match exactly once; include surrounding context \
to disambiguate.
- run_command is synchronous and bounded by a timeout; use run_background \
for servers and watchers, then get_process_output to inspect them.
- All paths must be absolute and inside the allowed roots.";

/// Assemble the system prompt document.
pub async fn assemble(ctx: &ServerContext) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "# Environment\ntime: {}\nos: {} ({})\ncwd: {}",
        Utc::now().to_rfc3339(),
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|_| "<unknown>".to_string()),
    ));

    sections.push(format!(
        "# Allowed roots\n{}",
        ctx.permissions
            .roots()
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    ));

    if let Some(git) = git_summary(ctx).await {
        sections.push(format!("# Git\n{}", git));
    }

    let projects = detect_projects(ctx);
    if !projects.is_empty() {
        sections.push(format!("# Project types\n{}", projects.join(", ")));
    }

    sections.push(format!("# Tools\n{}", tool_inventory(ctx).await));
    sections.push(USAGE_GUIDANCE.to_string());

    sections.join("\n\n")
}

/// Branch, dirtiness, and remote of the first allowed root that is a git
/// repository.
async fn git_summary(ctx: &ServerContext) -> Option<String> {
    let root = ctx
        .permissions
        .roots()
        .iter()
        .find(|root| root.join(".git").exists())?
        .clone();

    let branch = git(&root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    let dirty = git(&root, &["status", "--porcelain"])
        .await
        .map(|out| !out.is_empty())
        .unwrap_or(false);
    let remote = git(&root, &["remote", "get-url", "origin"]).await;

    let mut summary = format!(
        "repository: {}\nbranch: {}\nworking tree: {}",
        root.display(),
        branch,
        if dirty { "dirty" } else { "clean" }
    );
    if let Some(remote) = remote {
        summary.push_str(&format!("\nremote: {}", remote));
    }
    Some(summary)
}

async fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn detect_projects(ctx: &ServerContext) -> Vec<String> {
    let mut kinds = Vec::new();
    for root in ctx.permissions.roots() {
        for (marker, kind) in PROJECT_MARKERS {
            if root.join(marker).exists() && !kinds.contains(&kind.to_string()) {
                kinds.push(kind.to_string());
            }
        }
    }
    kinds
}

async fn tool_inventory(ctx: &ServerContext) -> String {
    let registry = ctx.registry.read().await;
    let mut by_category: Vec<(String, Vec<String>)> = Vec::new();
    for tool in registry.enabled() {
        let category = tool.category.to_string();
        match by_category.iter_mut().find(|(c, _)| *c == category) {
            Some((_, names)) => names.push(tool.name.clone()),
            None => by_category.push((category, vec![tool.name.clone()])),
        }
    }
    by_category
        .iter()
        .map(|(category, names)| format!("{}: {}", category, names.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}
