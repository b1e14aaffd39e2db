//! Built-in tool modules and the manifest that lists them.
//!
//! A module exposes one `register_<module>_tool` hook. Adding a module
//! means adding a file here and an entry to [`builtin_modules`].

pub mod img2img;
pub mod resource_info;
pub mod txt2img;

mod args;

use comfymcp_core::params::{apply_parameters, randomize_seeds, validate_bindings, JobParameters, NodeBindings};

use crate::context::ToolContext;
use crate::error::{RegistrationError, ToolError};
use crate::registry::StaticModule;

/// Every module compiled into the server, in registration order.
pub fn builtin_modules() -> Vec<StaticModule> {
    vec![
        StaticModule::new(txt2img::TOOL_NAME, txt2img::register_txt2img_tool),
        StaticModule::new(img2img::TOOL_NAME, img2img::register_img2img_tool),
        StaticModule::new(resource_info::MODULE_NAME, resource_info::register_resource_info_tool),
    ]
}

// ---------------------------------------------------------------------------
// Shared generation flow
// ---------------------------------------------------------------------------

/// Load the tool's template once and check it against the tool's bindings.
///
/// Runs inside a registration hook, so the read is synchronous.
fn check_template(
    ctx: &ToolContext,
    tool: &str,
    bindings: &NodeBindings,
) -> Result<(), RegistrationError> {
    let template_error = |source| RegistrationError::Template {
        tool: tool.to_string(),
        source,
    };
    let template = ctx.templates.load_blocking(tool).map_err(template_error)?;
    validate_bindings(&template, bindings).map_err(template_error)
}

/// Load a fresh template, parameterize it, run it, and render the
/// resulting images as Markdown links, one per line.
async fn generate(
    ctx: &ToolContext,
    tool: &str,
    service: &str,
    bindings: &NodeBindings,
    params: &JobParameters,
) -> Result<String, ToolError> {
    let mut template = ctx
        .templates
        .load(tool)
        .await
        .map_err(|e| ToolError::from_core(service, e))?;

    let seeds = randomize_seeds(&mut template);
    apply_parameters(&mut template, bindings, params).map_err(|e| ToolError::from_core(service, e))?;
    tracing::debug!(tool, seeds, "Template parameterized");

    let job = ctx
        .runner
        .run_job(&template, &ctx.cancel)
        .await
        .map_err(|e| ToolError::from_job(service, e))?;

    let links = job
        .artifacts
        .iter()
        .map(|artifact| ctx.api().view_url(artifact).map(|url| format!("![image]({url})")))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ToolError::service(service, e))?;

    tracing::info!(tool, prompt_id = %job.prompt_id, images = links.len(), "Generation finished");
    Ok(links.join("\n"))
}
