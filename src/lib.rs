//! # hanzo-mcp
//!
//! MCP (Model Context Protocol) tool server exposing developer-productivity
//! tools — file I/O, code search, shell execution, background process
//! supervision, and uniqueness-checked file editing — to a host AI assistant
//! over line-delimited JSON-RPC 2.0 on stdio.
//!
//! ## Architecture
//!
//! - **Protocol layer**: JSON-RPC 2.0 types and the stdio framing transport
//! - **Permission layer**: path sandbox and command policy, checked inside
//!   every handler that touches the OS
//! - **Server layer**: request dispatch, the tool registry, argument
//!   validation, and the tool-result envelope
//! - **Handler layer**: one module per tool family
//!
//! Tool failures are never JSON-RPC errors: a failed tool call is a
//! successful response whose payload carries `isError=true`, so the host
//! can recover conversationally.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hanzo_mcp::{McpServer, ServerConfig, ServerContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::resolve(vec!["/tmp/proj".into()], None)?;
//!     let ctx = ServerContext::new(config)?;
//!     McpServer::new(ctx).serve_stdio().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod install;
pub mod permissions;
pub mod protocol;
pub mod search;
pub mod server;
pub mod supervisor;
pub mod sysprompt;

// Re-export main types
pub use config::ServerConfig;
pub use context::ServerContext;
pub use error::{McpError, Result};
pub use permissions::PermissionManager;
pub use protocol::{JsonRpcRequest, JsonRpcResponse, StdioTransport, Transport};
pub use server::result::{ContentPart, ToolResult};
pub use server::McpServer;
pub use supervisor::ProcessSupervisor;
