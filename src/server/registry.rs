//! Tool descriptors and the runtime registry
//!
//! The registry holds one descriptor per tool: name, description, category,
//! input schema, and an enabled flag. Dispatch itself is a match on the tool
//! name in the handler layer; the registry is the source of truth for what
//! is listed, what may be called, and what can be toggled at runtime.

use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Tool category used for grouping in listings and the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Filesystem,
    Edit,
    Search,
    Shell,
    Process,
    Admin,
    Agent,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::Edit => "edit",
            ToolCategory::Search => "search",
            ToolCategory::Shell => "shell",
            ToolCategory::Process => "process",
            ToolCategory::Admin => "admin",
            ToolCategory::Agent => "agent",
        };
        write!(f, "{}", name)
    }
}

/// Descriptor for one registered tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub input_schema: Value,
    pub enabled: bool,
}

impl ToolDescriptor {
    /// Wire shape for `tools/list`
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// The administrative tools that are always enabled and can never be
/// disabled, so a client can always recover from its own toggles.
pub const PROTECTED_TOOLS: &[&str] = &["tool_list", "tool_enable", "tool_disable"];

/// Runtime tool registry
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Build the registry for a server configuration. Write tools are
    /// registered disabled under `--disable-write`, search tools under
    /// `--disable-search`; the agent tool is only registered at all when
    /// the delegator is enabled.
    pub fn for_config(config: &ServerConfig) -> Result<Self> {
        let mut registry = Self {
            tools: BTreeMap::new(),
        };

        let write_ok = !config.disable_write;
        let search_ok = !config.disable_search;

        for mut descriptor in descriptors() {
            match descriptor.category {
                ToolCategory::Edit => descriptor.enabled = write_ok,
                ToolCategory::Search => descriptor.enabled = search_ok,
                ToolCategory::Filesystem if descriptor.name == "write" => {
                    descriptor.enabled = write_ok
                }
                ToolCategory::Agent if descriptor.name == "agent" => {
                    if !config.enable_agent {
                        continue;
                    }
                }
                _ => {}
            }
            registry.register(descriptor)?;
        }

        Ok(registry)
    }

    /// Register a descriptor. Duplicate names are a startup error.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if !descriptor
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            || descriptor.name.is_empty()
        {
            return Err(McpError::Internal(format!(
                "invalid tool name: {:?}",
                descriptor.name
            )));
        }
        if self.tools.contains_key(&descriptor.name) {
            return Err(McpError::Internal(format!(
                "duplicate tool name: {}",
                descriptor.name
            )));
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Enabled descriptors in name order
    pub fn enabled(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().filter(|t| t.enabled).collect()
    }

    /// All descriptors, including disabled ones, in name order
    pub fn all(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().collect()
    }

    /// Look up a descriptor by name; disabled tools resolve too, so error
    /// messages can distinguish "unknown" from "disabled".
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Enable a tool by name
    pub fn enable(&mut self, name: &str) -> Result<()> {
        match self.tools.get_mut(name) {
            Some(tool) => {
                tool.enabled = true;
                Ok(())
            }
            None => Err(McpError::NotFound(format!("no such tool: {}", name))),
        }
    }

    /// Disable a tool by name. The administrative tools refuse.
    pub fn disable(&mut self, name: &str) -> Result<()> {
        if PROTECTED_TOOLS.contains(&name) {
            return Err(McpError::Conflict(format!(
                "tool '{}' cannot be disabled",
                name
            )));
        }
        match self.tools.get_mut(name) {
            Some(tool) => {
                tool.enabled = false;
                Ok(())
            }
            None => Err(McpError::NotFound(format!("no such tool: {}", name))),
        }
    }
}

/// The full tool catalog.
fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "read".to_string(),
            description:
                "Read a file as text. Detects UTF-8/UTF-16/Latin-1 encodings; binary files \
                 return a placeholder. Supports line-based pagination via offset and limit."
                    .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to the file"},
                    "offset": {"type": "integer", "description": "0-based line to start from", "default": 0},
                    "limit": {"type": "integer", "description": "Maximum number of lines to return"}
                },
                "required": ["path"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "write".to_string(),
            description:
                "Write UTF-8 content to a file atomically, creating missing parent \
                 directories inside the allowed roots."
                    .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to write"},
                    "content": {"type": "string", "description": "File content"}
                },
                "required": ["path", "content"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "list".to_string(),
            description: "List a directory's entries with file/directory markers; optional glob filter."
                .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute directory path"},
                    "pattern": {"type": "string", "description": "Glob applied to entry names"}
                },
                "required": ["path"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "tree".to_string(),
            description:
                "Render a directory tree. Noise directories (node_modules, .git, target, ...) \
                 are filtered unless include_filtered is set."
                    .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute directory path"},
                    "depth": {"type": "integer", "description": "Maximum depth", "default": 3},
                    "show_hidden": {"type": "boolean", "default": false},
                    "dirs_only": {"type": "boolean", "default": false},
                    "show_size": {"type": "boolean", "default": false},
                    "pattern": {"type": "string", "description": "Glob applied to file names"},
                    "include_filtered": {"type": "boolean", "default": false}
                },
                "required": ["path"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "find".to_string(),
            description: "Find files and directories by name pattern (glob or substring)."
                .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Glob or substring to match names against"},
                    "path": {"type": "string", "description": "Root to search under (defaults to all allowed roots)"},
                    "kind": {"type": "string", "enum": ["file", "dir", "any"], "default": "any"},
                    "max_results": {"type": "integer", "default": 200}
                },
                "required": ["pattern"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "file_info".to_string(),
            description: "Size, kind, modification time, mode bits, and symlink target of a path."
                .to_string(),
            category: ToolCategory::Filesystem,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path"}
                },
                "required": ["path"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "edit".to_string(),
            description:
                "Replace old_text with new_text in a file. old_text must match exactly once \
                 unless replace_all is set; ambiguous matches fail without modifying the file."
                    .to_string(),
            category: ToolCategory::Edit,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to the file"},
                    "old_text": {"type": "string", "description": "Literal text to replace (whitespace significant)"},
                    "new_text": {"type": "string", "description": "Replacement text"},
                    "replace_all": {"type": "boolean", "default": false}
                },
                "required": ["path", "old_text", "new_text"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "multi_edit".to_string(),
            description:
                "Apply an ordered batch of edits to one file atomically: if any edit fails, \
                 the file is left untouched."
                    .to_string(),
            category: ToolCategory::Edit,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Absolute path to the file"},
                    "edits": {
                        "type": "array",
                        "description": "Edits applied in order against the running content",
                        "items": {
                            "type": "object",
                            "properties": {
                                "old_text": {"type": "string"},
                                "new_text": {"type": "string"},
                                "replace_all": {"type": "boolean"}
                            }
                        }
                    }
                },
                "required": ["path", "edits"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "grep".to_string(),
            description:
                "Search file contents for a pattern using the best available backend \
                 (ripgrep, ag, ack, or a built-in engine)."
                    .to_string(),
            category: ToolCategory::Search,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression to search for"},
                    "path": {"type": "string", "description": "Root to search under (defaults to all allowed roots)"},
                    "include": {"type": "string", "description": "Glob restricting which files are searched"},
                    "ignore_case": {"type": "boolean", "default": false},
                    "line_numbers": {"type": "boolean", "default": true},
                    "context": {"type": "integer", "description": "Context lines around each match", "default": 0},
                    "max_results": {"type": "integer", "default": 200}
                },
                "required": ["pattern"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "search".to_string(),
            description:
                "Unified search: file names, file contents, and git history in one call, \
                 reported as separate sections."
                    .to_string(),
            category: ToolCategory::Search,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Text to search for"},
                    "path": {"type": "string", "description": "Root to search under (defaults to all allowed roots)"},
                    "kind": {"type": "string", "enum": ["text", "filename", "any"], "default": "any"},
                    "ignore_case": {"type": "boolean", "default": true},
                    "max_results": {"type": "integer", "default": 50}
                },
                "required": ["pattern"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "run_command".to_string(),
            description:
                "Run a shell command synchronously with a timeout. Non-zero exit status is \
                 reported as data, not as an error."
                    .to_string(),
            category: ToolCategory::Shell,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Command line to execute"},
                    "cwd": {"type": "string", "description": "Working directory (must be inside the allowed roots)"},
                    "env": {"type": "object", "description": "Environment variable overlay"},
                    "timeout": {"type": "integer", "description": "Timeout in milliseconds", "default": 30000},
                    "use_login_shell": {"type": "boolean", "description": "Run through the user's login shell", "default": false}
                },
                "required": ["command"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "run_script".to_string(),
            description: "Run a script through an interpreter (default bash) under the shell contract."
                .to_string(),
            category: ToolCategory::Shell,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "script": {"type": "string", "description": "Script body"},
                    "interpreter": {"type": "string", "description": "Interpreter to run the script with", "default": "bash"},
                    "cwd": {"type": "string", "description": "Working directory (must be inside the allowed roots)"},
                    "timeout": {"type": "integer", "description": "Timeout in milliseconds", "default": 30000}
                },
                "required": ["script"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "run_background".to_string(),
            description:
                "Start a named background process. The process is detached and survives \
                 server shutdown; output is captured in bounded buffers."
                    .to_string(),
            category: ToolCategory::Process,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Caller-chosen identifier, unique among live processes"},
                    "command": {"type": "string", "description": "Command line to execute"},
                    "cwd": {"type": "string", "description": "Working directory (must be inside the allowed roots)"}
                },
                "required": ["id", "command"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "list_processes".to_string(),
            description: "Snapshot of all supervised background processes.".to_string(),
            category: ToolCategory::Process,
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "get_process_output".to_string(),
            description: "Tail the captured stdout/stderr of a background process.".to_string(),
            category: ToolCategory::Process,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Process identifier"},
                    "tail": {"type": "integer", "description": "Number of trailing lines per stream", "default": 50}
                },
                "required": ["id"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "kill_process".to_string(),
            description:
                "Terminate a background process (SIGTERM, then SIGKILL after a grace period) \
                 and remove its record."
                    .to_string(),
            category: ToolCategory::Process,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Process identifier"}
                },
                "required": ["id"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "tool_list".to_string(),
            description: "List every registered tool with its category and enabled state."
                .to_string(),
            category: ToolCategory::Admin,
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "tool_enable".to_string(),
            description: "Enable a tool by name.".to_string(),
            category: ToolCategory::Admin,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Tool name"}
                },
                "required": ["name"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "tool_disable".to_string(),
            description: "Disable a tool by name. The tool_* administrative tools refuse."
                .to_string(),
            category: ToolCategory::Admin,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Tool name"}
                },
                "required": ["name"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "think".to_string(),
            description:
                "Record a thought without performing any action. Useful for reasoning \
                 between tool calls."
                    .to_string(),
            category: ToolCategory::Agent,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string", "description": "The thought to record"}
                },
                "required": ["thought"]
            }),
            enabled: true,
        },
        ToolDescriptor {
            name: "agent".to_string(),
            description:
                "Delegate a task to a constrained read-only worker with bounded iterations \
                 and tool calls."
                    .to_string(),
            category: ToolCategory::Agent,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string", "description": "Task description for the worker"},
                    "model": {"type": "string", "description": "Model identifier override"}
                },
                "required": ["task"]
            }),
            enabled: true,
        },
    ]
}
