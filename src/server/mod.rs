//! MCP server implementation
//!
//! Owns the framing loop: requests are read in arrival order, each runs in
//! its own task under a bounded-concurrency semaphore, and responses funnel
//! through a single writer so every byte on stdout is exactly one JSON
//! object per line. Responses may complete out of order; JSON-RPC id
//! correlation makes that legal.

pub mod registry;
pub mod result;
pub mod schema;

use crate::context::ServerContext;
use crate::error::{McpError, Result};
use crate::protocol::transport::Frame;
use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, StdioTransport, Transport,
};
use crate::sysprompt;
use result::ToolResult;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// MCP protocol revision advertised in `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// How long in-flight handlers get to finish after EOF.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// MCP server
pub struct McpServer {
    ctx: Arc<ServerContext>,
}

impl McpServer {
    /// Create a new server over a prepared context
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Serve requests over stdio
    pub async fn serve_stdio(&self) -> Result<()> {
        info!(
            server = self.ctx.config.name,
            version = self.ctx.config.version,
            uid = unsafe { libc::geteuid() },
            "MCP server listening on stdio"
        );
        self.serve(StdioTransport::stdio()).await
    }

    /// Serve requests over an arbitrary transport.
    pub async fn serve<R, W>(&self, transport: Transport<R, W>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (mut rx, mut tx) = transport.into_split();

        // Single writer task: the only place protocol bytes are emitted.
        let (out_tx, mut out_rx) = mpsc::channel::<JsonRpcResponse>(64);
        let writer = tokio::spawn(async move {
            while let Some(response) = out_rx.recv().await {
                if let Err(e) = tx.write_response(&response).await {
                    error!(error = %e, "failed to write response");
                    break;
                }
            }
            let _ = tx.close().await;
        });

        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            let frame = match rx.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("client disconnected");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "transport read failed");
                    break;
                }
            };

            // Opportunistically reap completed handler tasks.
            while inflight.try_join_next().is_some() {}

            match frame {
                Frame::Malformed(_) => {
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    if out_tx.send(response).await.is_err() {
                        break;
                    }
                }
                Frame::Request(request) => {
                    let ctx = Arc::clone(&self.ctx);
                    let out = out_tx.clone();
                    let permits = Arc::clone(&permits);
                    inflight.spawn(async move {
                        let _permit = permits.acquire_owned().await;
                        if let Some(response) = handle_request(&ctx, request).await {
                            let _ = out.send(response).await;
                        }
                    });
                }
            }
        }

        // Stop accepting, give in-flight handlers a bounded grace period,
        // then abort whatever remains. Background processes are left alone.
        drop(out_tx);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("grace period expired; aborting in-flight handlers");
            inflight.shutdown().await;
        }

        let _ = writer.await;
        Ok(())
    }
}

/// Handle one request. Returns `None` for notifications, which are executed
/// for their side effects but never answered.
pub async fn handle_request(
    ctx: &ServerContext,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone();
    let is_notification = request.is_notification();

    let result = match request.method.as_str() {
        "initialize" => handle_initialize(ctx).await,
        "tools/list" => handle_tools_list(ctx).await,
        "tools/call" => handle_tool_call(ctx, request.params).await,
        "resources/list" => handle_resources_list(ctx).await,
        "resources/read" => handle_resources_read(ctx, request.params).await,
        method if method.starts_with("notifications/") => Ok(Value::Null),
        method => Err(McpError::MethodNotFound(method.to_string())),
    };

    if is_notification {
        if let Err(e) = result {
            warn!(error = %e, "notification failed");
        }
        return None;
    }

    Some(match result {
        Ok(value) => JsonRpcResponse::success(id.unwrap_or(RequestId::Number(0)), value),
        Err(e) => {
            warn!(error = %e, method = %request.method, "request failed");
            JsonRpcResponse::error(id, e.to_jsonrpc())
        }
    })
}

async fn handle_initialize(ctx: &ServerContext) -> Result<Value> {
    Ok(json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": ctx.config.name,
            "version": ctx.config.version,
        },
        "capabilities": {
            "tools": {},
            "resources": {},
        },
    }))
}

async fn handle_tools_list(ctx: &ServerContext) -> Result<Value> {
    let registry = ctx.registry.read().await;
    let tools: Vec<Value> = registry
        .enabled()
        .iter()
        .map(|tool| tool.to_listing())
        .collect();
    Ok(json!({ "tools": tools }))
}

/// Resolve, validate, and invoke a tool. Tool-level failures — unknown or
/// disabled tools, schema violations, handler errors — are all rendered as
/// result envelopes with `isError=true`, never as JSON-RPC errors.
async fn handle_tool_call(ctx: &ServerContext, params: Option<Value>) -> Result<Value> {
    let params = params.ok_or_else(|| McpError::InvalidParams("missing parameters".to_string()))?;
    let name = params["name"]
        .as_str()
        .ok_or_else(|| McpError::InvalidParams("missing tool name".to_string()))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let schema = {
        let registry = ctx.registry.read().await;
        match registry.get(name) {
            None => {
                return Ok(ToolResult::error(format!("no such tool: '{}'", name)).to_value());
            }
            Some(descriptor) if !descriptor.enabled => {
                return Ok(
                    ToolResult::error(format!("tool '{}' is disabled", name)).to_value()
                );
            }
            Some(descriptor) => descriptor.input_schema.clone(),
        }
    };

    let envelope = match schema::validate(&arguments, &schema) {
        Err(e) => ToolResult::from(e),
        Ok(args) => match crate::handlers::dispatch(ctx, name, &args).await {
            Ok(envelope) => envelope,
            Err(e) if e.is_tool_error() => ToolResult::from(e),
            Err(e) => return Err(e),
        },
    };

    Ok(envelope.to_value())
}

async fn handle_resources_list(_ctx: &ServerContext) -> Result<Value> {
    Ok(json!({
        "resources": [{
            "uri": sysprompt::SYSTEM_PROMPT_URI,
            "name": "System prompt",
            "description": "Environment, project, and tool inventory for the host assistant",
            "mimeType": "text/plain",
        }]
    }))
}

async fn handle_resources_read(ctx: &ServerContext, params: Option<Value>) -> Result<Value> {
    let params = params.ok_or_else(|| McpError::InvalidParams("missing parameters".to_string()))?;
    let uri = params["uri"]
        .as_str()
        .ok_or_else(|| McpError::InvalidParams("missing 'uri' parameter".to_string()))?;

    if uri != sysprompt::SYSTEM_PROMPT_URI {
        return Err(McpError::ResourceNotFound(uri.to_string()));
    }

    let text = sysprompt::assemble(ctx).await;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "text/plain",
            "text": text,
        }]
    }))
}
