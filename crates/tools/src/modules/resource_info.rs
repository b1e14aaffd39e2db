//! The `info://ckpt` resource: installed checkpoints as a Markdown list.
//!
//! Built from the local capability cache. Reading it never fails; any
//! problem with the cache is explained in the returned text instead.

use std::sync::Arc;

use async_trait::async_trait;
use comfymcp_core::capability::{CapabilityMap, CapabilityStore};

use crate::context::ToolContext;
use crate::error::{RegistrationError, ToolError};
use crate::handler::{ResourceDescriptor, ResourceHandler, ToolSet};

pub const MODULE_NAME: &str = "resource_info";
pub const CHECKPOINT_RESOURCE_URI: &str = "info://ckpt";

const NO_CACHE_MESSAGE: &str = "Could not load the ComfyUI node descriptions. Make sure the \
                                server has fetched them from ComfyUI.";
const NO_DESCRIPTION: &str = "No description";

pub fn register_resource_info_tool(
    set: &mut ToolSet,
    ctx: &ToolContext,
) -> Result<(), RegistrationError> {
    set.add_resource(Arc::new(CheckpointList {
        capabilities: ctx.capabilities.clone(),
    }))
}

pub struct CheckpointList {
    capabilities: CapabilityStore,
}

#[async_trait]
impl ResourceHandler for CheckpointList {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: CHECKPOINT_RESOURCE_URI.to_string(),
            name: "checkpoint_list".to_string(),
            description: "ComfyUI checkpoint models available for generation".to_string(),
            mime_type: "text/markdown".to_string(),
        }
    }

    async fn read(&self) -> Result<String, ToolError> {
        Ok(render_checkpoint_list(self.capabilities.load().await.as_ref()))
    }
}

/// Markdown listing of the installed checkpoints, or an explanation of why
/// there is none.
pub fn render_checkpoint_list(capabilities: Option<&CapabilityMap>) -> String {
    let Some(map) = capabilities else {
        return NO_CACHE_MESSAGE.to_string();
    };

    let options = match map.checkpoint_options() {
        Ok(options) => options,
        Err(e) => return e.to_string(),
    };

    let mut lines = vec![
        "## ComfyUI checkpoint models".to_string(),
        format!(
            "Description: {}",
            options.tooltip.as_deref().unwrap_or(NO_DESCRIPTION)
        ),
        format!("Found {} models\n", options.models.len()),
    ];
    lines.extend(
        options
            .models
            .iter()
            .enumerate()
            .map(|(i, model)| format!("{}. {model}", i + 1)),
    );
    lines.join("\n")
}
