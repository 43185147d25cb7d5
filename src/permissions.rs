//! Path sandbox and command policy
//!
//! Every filesystem and shell operation consults this module before touching
//! the OS. A path is permitted when its canonical, symlink-resolved form sits
//! under one of the allowed roots at a path-component boundary and matches no
//! deny pattern. The policy is built once at startup and never mutated.

use crate::error::{McpError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File-name globs that are always denied: credentials, keys, histories.
const DENY_FILE_PATTERNS: &[&str] = &[
    "*.pem",
    "*.key",
    "*.crt",
    "id_rsa*",
    "id_ed25519*",
    ".env",
    ".env.*",
    "*.keychain",
    "*_history",
    ".netrc",
];

/// Directory names that are always denied wherever they appear, except
/// `.git`, which is deliberately permitted under an allowed root.
const DENY_DIR_COMPONENTS: &[&str] = &[".ssh", ".gnupg", ".aws", ".hanzo"];

/// Destructive command prefixes that are rejected outright.
const DENY_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    "dd if=",
    "dd of=/dev/",
    ":(){ :|:& };:",
    "chmod -R 777 /",
    "> /etc/",
];

/// System locations a command may never reference as a write target.
const DENY_WRITE_PREFIXES: &[&str] = &["/etc/", "/boot/", "/sys/", "/proc/"];

/// Permission manager holding the immutable sandbox policy.
pub struct PermissionManager {
    roots: Vec<PathBuf>,
    deny_files: GlobSet,
}

impl PermissionManager {
    /// Build the policy from the configured roots. Each root is
    /// canonicalized; a root that cannot be resolved is a startup error.
    pub fn new(allowed_paths: &[PathBuf]) -> Result<Self> {
        let mut roots = Vec::with_capacity(allowed_paths.len());
        for path in allowed_paths {
            let canon = path.canonicalize().map_err(|e| {
                McpError::Internal(format!(
                    "cannot resolve allowed path {}: {}",
                    path.display(),
                    e
                ))
            })?;
            debug!(root = %canon.display(), "registered allowed root");
            roots.push(canon);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in DENY_FILE_PATTERNS {
            builder.add(
                Glob::new(pattern)
                    .map_err(|e| McpError::Internal(format!("bad deny pattern: {}", e)))?,
            );
        }
        let deny_files = builder
            .build()
            .map_err(|e| McpError::Internal(format!("deny set: {}", e)))?;

        Ok(Self { roots, deny_files })
    }

    /// The canonicalized allowed roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check whether `path` may be accessed.
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        let Some(canon) = self.normalize(path) else {
            return false;
        };

        if self.is_denied(&canon) {
            return false;
        }

        self.roots.iter().any(|root| canon.starts_with(root))
    }

    /// Like [`is_path_allowed`] but returns the specific denial as an error,
    /// so handlers report the attempted path.
    pub fn check_path(&self, path: &Path) -> Result<PathBuf> {
        let canon = self
            .normalize(path)
            .ok_or_else(|| McpError::not_permitted(path))?;
        if self.is_denied(&canon) || !self.roots.iter().any(|root| canon.starts_with(root)) {
            return Err(McpError::not_permitted(path));
        }
        Ok(canon)
    }

    /// Permission check for a mutation: the target and its parent directory
    /// must both pass.
    pub fn check_write(&self, path: &Path) -> Result<PathBuf> {
        let canon = self.check_path(path)?;
        if let Some(parent) = canon.parent() {
            self.check_path(parent)?;
        }
        Ok(canon)
    }

    /// Conservative static screen for shell commands. Rejects the
    /// destructive deny-list and statically detectable escapes (absolute
    /// paths and redirection targets outside the roots); borderline commands
    /// pass and run with a constrained cwd.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return false;
        }

        for denied in DENY_COMMANDS {
            if trimmed.contains(denied) {
                debug!(command = trimmed, pattern = denied, "command denied");
                return false;
            }
        }

        // Redirection into a protected system location.
        for (index, _) in trimmed.match_indices('>') {
            let target = trimmed[index + 1..]
                .trim_start_matches('>')
                .trim_start()
                .split_whitespace()
                .next()
                .unwrap_or("");
            if DENY_WRITE_PREFIXES
                .iter()
                .any(|prefix| target.starts_with(prefix))
            {
                debug!(command = trimmed, target = target, "redirection denied");
                return false;
            }
        }

        // Absolute path arguments pointing at denied files.
        for word in trimmed.split_whitespace() {
            let word = word.trim_matches(|c| c == '"' || c == '\'');
            if word.starts_with('/') {
                let path = Path::new(word);
                if self.is_denied(path) {
                    debug!(command = trimmed, path = word, "denied path in command");
                    return false;
                }
            }
        }

        true
    }

    /// Command check that reports the offending command as an error.
    pub fn check_command(&self, command: &str) -> Result<()> {
        if self.is_command_allowed(command) {
            Ok(())
        } else {
            Err(McpError::CommandDenied(command.to_string()))
        }
    }

    /// Canonicalize a path, resolving symlinks through the deepest existing
    /// ancestor so that not-yet-created targets can still be judged.
    /// Relative paths are rejected: the tool contract requires absolute
    /// paths.
    fn normalize(&self, path: &Path) -> Option<PathBuf> {
        if !path.is_absolute() {
            return None;
        }

        if let Ok(canon) = path.canonicalize() {
            return Some(canon);
        }

        // Walk up to the nearest existing ancestor, canonicalize that, and
        // reattach the remaining (lexically cleaned) components.
        let mut existing = path;
        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail.push(name);
                    }
                    if parent.exists() {
                        let mut canon = parent.canonicalize().ok()?;
                        for part in tail.iter().rev() {
                            if *part == std::ffi::OsStr::new("..")
                                || *part == std::ffi::OsStr::new(".")
                            {
                                return None;
                            }
                            canon.push(part);
                        }
                        return Some(canon);
                    }
                    existing = parent;
                }
                None => return None,
            }
        }
    }

    /// Deny-pattern check on a canonical path: file-name globs plus denied
    /// directory components. `.git` is explicitly permitted.
    fn is_denied(&self, canon: &Path) -> bool {
        if let Some(name) = canon.file_name() {
            if self.deny_files.is_match(Path::new(name)) {
                return true;
            }
        }

        canon.components().any(|component| match component {
            Component::Normal(name) => DENY_DIR_COMPONENTS
                .iter()
                .any(|denied| name == std::ffi::OsStr::new(denied)),
            _ => false,
        })
    }
}
