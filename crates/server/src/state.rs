use std::sync::Arc;

use comfymcp_tools::handler::ToolSet;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Registered tools and resources. Read-only after startup.
    pub tools: Arc<ToolSet>,
    pub config: Arc<ServerConfig>,
}
