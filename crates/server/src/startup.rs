//! Assembly of the tool set from configuration.

use std::sync::Arc;

use comfymcp_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use comfymcp_comfyui::orchestrator::JobRunner;
use comfymcp_comfyui::sync::sync_capability_cache;
use comfymcp_core::capability::CapabilityStore;
use comfymcp_core::template::TemplateStore;
use comfymcp_tools::context::ToolContext;
use comfymcp_tools::envelope::CallSink;
use comfymcp_tools::handler::ToolSet;
use comfymcp_tools::modules::builtin_modules;
use comfymcp_tools::registry::{discover_and_register, RegistrationReport, ToolModule};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The backend client could not be constructed.
    #[error(transparent)]
    Client(#[from] ComfyUIApiError),

    /// The registration pass did not run to completion.
    #[error("Tool registration aborted: {0}")]
    Registration(#[from] JoinError),
}

/// The registered tools plus what happened while registering them.
pub struct Startup {
    pub tools: ToolSet,
    pub report: RegistrationReport,
    /// Whether a capability cache was available after the sync.
    pub capabilities_cached: bool,
}

/// Build the backend client, sync the capability cache and register every
/// built-in module.
///
/// Only a client that cannot be constructed, or a registration pass that
/// dies outright, is fatal. An unreachable backend or a broken module
/// degrades the service instead.
pub async fn build_tool_set(
    config: &ServerConfig,
    sink: Arc<dyn CallSink>,
    cancel: CancellationToken,
) -> Result<Startup, StartupError> {
    let backend = &config.backend;
    let api = Arc::new(ComfyUIApi::with_timeout(
        backend.api_url(),
        backend.request_timeout(),
    )?);
    tracing::info!(api_url = api.api_url(), "ComfyUI client ready");

    let capabilities =
        CapabilityStore::new(&config.object_info_dir, backend.host.clone(), backend.port);
    let capabilities_cached = sync_capability_cache(&api, &capabilities).await;

    let ctx = ToolContext {
        runner: JobRunner::new(api, backend.poll_config()),
        templates: TemplateStore::new(&config.template_dir),
        capabilities,
        cancel,
    };

    // Registration hooks read template files synchronously.
    let (tools, report) = tokio::task::spawn_blocking(move || {
        let mut tools = ToolSet::new(sink);
        let modules = builtin_modules();
        let report = discover_and_register(
            modules.iter().map(|m| m as &dyn ToolModule),
            &mut tools,
            &ctx,
        );
        (tools, report)
    })
    .await?;

    Ok(Startup {
        tools,
        report,
        capabilities_cached,
    })
}
