//! Error types for the MCP server
//!
//! Protocol-level failures (bad JSON-RPC, unknown methods) map to JSON-RPC
//! error responses. Everything a tool handler can produce — permission
//! denials, missing files, edit conflicts, timeouts — renders into the
//! tool-result envelope with `isError=true` and is never raised across the
//! transport.

use crate::protocol::JsonRpcError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;

/// MCP server errors
#[derive(Debug, Error)]
pub enum McpError {
    /// Protocol error (invalid JSON-RPC)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters at the protocol level
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Requested resource URI is not served
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Arguments failed the tool's declared schema; names the field
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// Path or command blocked by the permission policy
    #[error("Permission denied: {} is not within the allowed paths", .0.display())]
    PermissionDenied(PathBuf),

    /// Command blocked by the command policy
    #[error("Command not permitted: {0}")]
    CommandDenied(String),

    /// Target file, directory, or process id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Edit with non-unique old_text, duplicate background id, and similar
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Shell command exceeded its limit
    #[error("Command timed out after {0} ms")]
    Timeout(u64),

    /// A search backend or other external command failed unexpectedly
    #[error("External command failed: {0}")]
    External(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Convert to a JSON-RPC error object.
    ///
    /// Only the protocol-level variants should ever reach this path; tool
    /// failures are rendered into result envelopes by the dispatcher before
    /// a JSON-RPC response is built.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            McpError::Protocol(msg) => JsonRpcError::invalid_request(msg),
            McpError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            McpError::InvalidParams(msg) => JsonRpcError::invalid_params(msg),
            McpError::ResourceNotFound(uri) => JsonRpcError::resource_not_found(uri),
            McpError::Json(e) => JsonRpcError::invalid_params(e.to_string()),
            other => JsonRpcError::internal_error(other.to_string()),
        }
    }

    /// True for failures that belong in a tool-result envelope rather than a
    /// JSON-RPC error response.
    pub fn is_tool_error(&self) -> bool {
        !matches!(
            self,
            McpError::Protocol(_)
                | McpError::MethodNotFound(_)
                | McpError::InvalidParams(_)
                | McpError::ResourceNotFound(_)
        )
    }

    /// Permission failure for a path, naming the attempted resource
    pub fn not_permitted(path: impl Into<PathBuf>) -> Self {
        McpError::PermissionDenied(path.into())
    }
}
