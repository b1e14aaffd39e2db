//! Text-to-image generation.

use std::sync::Arc;

use async_trait::async_trait;
use comfymcp_core::params::{JobParameters, NodeBindings, MAX_BATCH_SIZE};
use serde_json::{json, Value};

use super::args::{optional_str, optional_u32, required_str};
use crate::context::ToolContext;
use crate::error::{RegistrationError, ToolError};
use crate::handler::{ToolDescriptor, ToolHandler, ToolSet};

pub const TOOL_NAME: &str = "txt2img";
const SERVICE: &str = "Text-to-image";

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_NEGATIVE_PROMPT: &str = "text, watermark";
pub const DEFAULT_BATCH_SIZE: u32 = 1;
pub const DEFAULT_MODEL: &str = "sd_xl_base_1.0.safetensors";

/// Node IDs of the bundled `txt2img` template.
pub fn bindings() -> NodeBindings {
    NodeBindings::new()
        .prompt("6")
        .negative_prompt("7")
        .latent("5")
        .checkpoint("4")
}

pub fn register_txt2img_tool(set: &mut ToolSet, ctx: &ToolContext) -> Result<(), RegistrationError> {
    let bindings = bindings();
    super::check_template(ctx, TOOL_NAME, &bindings)?;
    set.add_tool(Arc::new(Txt2ImgTool {
        ctx: ctx.clone(),
        bindings,
    }))
}

pub struct Txt2ImgTool {
    ctx: ToolContext,
    bindings: NodeBindings,
}

/// Every argument falls back to its default, so the template's built-in
/// values never leak into a call.
fn parse_args(args: &Value) -> Result<JobParameters, ToolError> {
    Ok(JobParameters {
        prompt: Some(required_str(args, "prompt")?),
        negative_prompt: Some(
            optional_str(args, "negative_prompt")?.unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string()),
        ),
        width: Some(optional_u32(args, "pic_width")?.unwrap_or(DEFAULT_WIDTH)),
        height: Some(optional_u32(args, "pic_height")?.unwrap_or(DEFAULT_HEIGHT)),
        batch_size: Some(optional_u32(args, "batch_size")?.unwrap_or(DEFAULT_BATCH_SIZE)),
        model: Some(optional_str(args, "model")?.unwrap_or_else(|| DEFAULT_MODEL.to_string())),
    })
}

/// The call's arguments with every default written in. Arguments that do
/// not parse are returned as given; the call itself reports them.
fn bind_args(args: &Value) -> Value {
    let Ok(params) = parse_args(args) else {
        return args.clone();
    };
    let mut bound = match args {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    bound.insert("prompt".into(), json!(params.prompt));
    bound.insert("pic_width".into(), json!(params.width));
    bound.insert("pic_height".into(), json!(params.height));
    bound.insert("negative_prompt".into(), json!(params.negative_prompt));
    bound.insert("batch_size".into(), json!(params.batch_size));
    bound.insert("model".into(), json!(params.model));
    Value::Object(bound)
}

#[async_trait]
impl ToolHandler for Txt2ImgTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: TOOL_NAME.to_string(),
            description: "Text-to-image: generate images from a prompt and return them as \
                          Markdown image links. Size, negative prompt, batch size and model \
                          are optional."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Positive prompt" },
                    "pic_width": {
                        "type": ["integer", "string"],
                        "description": "Output width in pixels",
                        "default": DEFAULT_WIDTH
                    },
                    "pic_height": {
                        "type": ["integer", "string"],
                        "description": "Output height in pixels",
                        "default": DEFAULT_HEIGHT
                    },
                    "negative_prompt": {
                        "type": "string",
                        "description": "Negative prompt",
                        "default": DEFAULT_NEGATIVE_PROMPT
                    },
                    "batch_size": {
                        "type": ["integer", "string"],
                        "description": format!("Images to generate, at most {MAX_BATCH_SIZE}"),
                        "default": DEFAULT_BATCH_SIZE
                    },
                    "model": {
                        "type": "string",
                        "description": "Checkpoint name (see info://ckpt)",
                        "default": DEFAULT_MODEL
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    fn bound_args(&self, args: &Value) -> Value {
        bind_args(args)
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let params = parse_args(&args)?;
        tracing::info!(
            tool = TOOL_NAME,
            batch_size = ?params.batch_size,
            "Text-to-image request received",
        );
        super::generate(&self.ctx, TOOL_NAME, SERVICE, &self.bindings, &params).await
    }
}
