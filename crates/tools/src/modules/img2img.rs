//! Image-to-image generation from the bundled source image.

use std::sync::Arc;

use async_trait::async_trait;
use comfymcp_core::params::{JobParameters, NodeBindings};
use serde_json::{json, Value};

use super::args::{optional_str, required_str};
use crate::context::ToolContext;
use crate::error::{RegistrationError, ToolError};
use crate::handler::{ToolDescriptor, ToolHandler, ToolSet};

pub const TOOL_NAME: &str = "img2img";
const SERVICE: &str = "Image-to-image";

/// Node IDs of the bundled `img2img` template. The latent comes from the
/// loaded image, so size and batch size are not settable.
pub fn bindings() -> NodeBindings {
    NodeBindings::new().prompt("6").negative_prompt("7").checkpoint("4")
}

pub fn register_img2img_tool(set: &mut ToolSet, ctx: &ToolContext) -> Result<(), RegistrationError> {
    let bindings = bindings();
    super::check_template(ctx, TOOL_NAME, &bindings)?;
    set.add_tool(Arc::new(Img2ImgTool {
        ctx: ctx.clone(),
        bindings,
    }))
}

pub struct Img2ImgTool {
    ctx: ToolContext,
    bindings: NodeBindings,
}

#[async_trait]
impl ToolHandler for Img2ImgTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: TOOL_NAME.to_string(),
            description: "Image-to-image: restyle the template's source image with a prompt \
                          and return the results as Markdown image links."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Positive prompt" },
                    "negative_prompt": {
                        "type": "string",
                        "description": "Negative prompt; the template's own is kept when omitted"
                    },
                    "model": {
                        "type": "string",
                        "description": "Checkpoint name; the template's own is kept when omitted"
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let params = JobParameters {
            prompt: Some(required_str(&args, "prompt")?),
            negative_prompt: optional_str(&args, "negative_prompt")?,
            model: optional_str(&args, "model")?,
            ..Default::default()
        };
        super::generate(&self.ctx, TOOL_NAME, SERVICE, &self.bindings, &params).await
    }
}
