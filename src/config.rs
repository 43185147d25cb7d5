//! Server configuration
//!
//! Assembled from CLI flags and environment at startup, validated once, and
//! immutable for the process lifetime.

use crate::error::{McpError, Result};
use std::path::PathBuf;

/// Environment variable carrying comma-separated allowed roots. CLI flags
/// take precedence when both are present.
pub const ALLOWED_PATHS_ENV: &str = "HANZO_ALLOWED_PATHS";

/// Upper bound a caller-supplied shell timeout is clamped to.
pub const MAX_COMMAND_TIMEOUT_MS: u64 = 600_000;

/// Default shell timeout when the caller does not pass one.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// MCP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server display name reported in `initialize`
    pub name: String,

    /// Server version reported in `initialize`
    pub version: String,

    /// Allowed directory roots, as given (canonicalized by the permission
    /// manager)
    pub allowed_paths: Vec<PathBuf>,

    /// Disable write/edit tools
    pub disable_write: bool,

    /// Disable search tools
    pub disable_search: bool,

    /// Register the agent delegator tool
    pub enable_agent: bool,

    /// Cap applied to caller-supplied shell timeouts, in milliseconds
    pub max_command_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "hanzo-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            allowed_paths: Vec::new(),
            disable_write: false,
            disable_search: false,
            enable_agent: false,
            max_command_timeout_ms: MAX_COMMAND_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from CLI-provided roots, falling back to
    /// `HANZO_ALLOWED_PATHS` when no flag was given.
    pub fn resolve(cli_paths: Vec<PathBuf>, name: Option<String>) -> Result<Self> {
        let allowed_paths = if !cli_paths.is_empty() {
            cli_paths
        } else {
            paths_from_env()
        };

        let mut config = Self {
            allowed_paths,
            ..Self::default()
        };
        if let Some(name) = name {
            config.name = name;
        }
        config.validate()?;
        Ok(config)
    }

    /// Startup validation: at least one root, every root an existing
    /// directory.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_paths.is_empty() {
            return Err(McpError::Internal(format!(
                "no allowed paths configured; pass --allow or set {}",
                ALLOWED_PATHS_ENV
            )));
        }
        for path in &self.allowed_paths {
            if !path.is_dir() {
                return Err(McpError::Internal(format!(
                    "allowed path is not a directory: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Configuration used by unit tests: the given roots, everything enabled.
    pub fn for_tests(allowed_paths: Vec<PathBuf>) -> Self {
        Self {
            allowed_paths,
            ..Self::default()
        }
    }
}

fn paths_from_env() -> Vec<PathBuf> {
    std::env::var(ALLOWED_PATHS_ENV)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}
