//! Desktop-host configuration installer
//!
//! Writes (or updates) the Claude Desktop configuration file so the host
//! launches this server over stdio with the given allowed roots.

use crate::error::{McpError, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

/// The well-known desktop configuration file for this platform.
pub fn desktop_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| McpError::Internal("HOME is not set".to_string()))?;

    let path = if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Claude/claude_desktop_config.json")
    } else {
        home.join(".config/Claude/claude_desktop_config.json")
    };
    Ok(path)
}

/// Register this server in the desktop configuration, preserving any other
/// entries already present.
pub fn install_desktop(server_name: &str, allowed_paths: &[PathBuf]) -> Result<PathBuf> {
    let config_path = desktop_config_path()?;
    install_at(&config_path, server_name, allowed_paths)?;
    Ok(config_path)
}

fn install_at(config_path: &PathBuf, server_name: &str, allowed_paths: &[PathBuf]) -> Result<()> {
    let binary = std::env::current_exe()
        .map_err(|e| McpError::Internal(format!("cannot locate server binary: {}", e)))?;

    let mut args = vec!["serve".to_string()];
    for path in allowed_paths {
        args.push("--allow".to_string());
        args.push(path.display().to_string());
    }

    let mut config: Value = match std::fs::read_to_string(config_path) {
        Ok(existing) => serde_json::from_str(&existing)
            .map_err(|e| McpError::Internal(format!("existing config is not valid JSON: {}", e)))?,
        Err(_) => json!({}),
    };

    if !config.is_object() {
        return Err(McpError::Internal(
            "existing config is not a JSON object".to_string(),
        ));
    }
    let servers = config
        .as_object_mut()
        .expect("checked object")
        .entry("mcpServers")
        .or_insert_with(|| json!({}));

    servers[server_name] = json!({
        "command": binary.display().to_string(),
        "args": args,
    });

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
    info!(path = %config_path.display(), server = server_name, "desktop configuration written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_creates_and_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("claude_desktop_config.json");
        std::fs::write(
            &config_path,
            r#"{"mcpServers": {"other": {"command": "/bin/other", "args": []}}}"#,
        )
        .unwrap();

        install_at(
            &config_path,
            "hanzo-mcp",
            &[PathBuf::from("/tmp/proj")],
        )
        .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert!(written["mcpServers"]["other"].is_object());
        let entry = &written["mcpServers"]["hanzo-mcp"];
        assert!(entry["command"].as_str().unwrap().len() > 0);
        let args: Vec<&str> = entry["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(args[0], "serve");
        assert!(args.contains(&"--allow"));
        assert!(args.contains(&"/tmp/proj"));
    }

    #[test]
    fn test_install_rejects_corrupt_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("claude_desktop_config.json");
        std::fs::write(&config_path, "not json at all").unwrap();

        let err = install_at(&config_path, "hanzo-mcp", &[]).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }
}
