use comfymcp_comfyui::api::ComfyUIApi;
use comfymcp_comfyui::orchestrator::JobRunner;
use comfymcp_core::capability::CapabilityStore;
use comfymcp_core::template::TemplateStore;
use tokio_util::sync::CancellationToken;

/// Everything a tool module needs, handed to its registration hook.
///
/// Cheap to clone; tools keep their own copy.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub runner: JobRunner,
    pub templates: TemplateStore,
    pub capabilities: CapabilityStore,
    /// Cancelled on shutdown; stops in-flight polling.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn api(&self) -> &ComfyUIApi {
        self.runner.api()
    }
}
