//! Shared server context
//!
//! Everything a tool handler needs: the configuration, the permission
//! policy, the tool registry, the background-process supervisor, and the
//! optional agent worker model.

use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use crate::handlers::agent_ops::WorkerModel;
use crate::permissions::PermissionManager;
use crate::server::registry::ToolRegistry;
use crate::supervisor::ProcessSupervisor;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Server context handed to every handler.
pub struct ServerContext {
    /// Immutable configuration
    pub config: ServerConfig,

    /// Immutable permission policy
    pub permissions: PermissionManager,

    /// Tool registry; mutable at runtime through tool_enable/tool_disable
    pub registry: RwLock<ToolRegistry>,

    /// Background process table
    pub supervisor: ProcessSupervisor,

    /// Agent worker model, installed once at startup when a provider is
    /// available
    worker_model: OnceLock<Arc<dyn WorkerModel>>,
}

impl ServerContext {
    /// Build the context for a validated configuration.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>> {
        let permissions = PermissionManager::new(&config.allowed_paths)?;
        let registry = RwLock::new(ToolRegistry::for_config(&config)?);

        Ok(Arc::new(Self {
            config,
            permissions,
            registry,
            supervisor: ProcessSupervisor::new(),
            worker_model: OnceLock::new(),
        }))
    }

    /// Install the agent worker model. May only be called once.
    pub fn set_worker_model(&self, model: Arc<dyn WorkerModel>) -> Result<()> {
        self.worker_model
            .set(model)
            .map_err(|_| McpError::Internal("worker model already installed".to_string()))
    }

    /// The installed worker model, if any.
    pub fn worker_model(&self) -> Option<Arc<dyn WorkerModel>> {
        self.worker_model.get().cloned()
    }
}
