//! Job templates and the on-disk template store.
//!
//! A job template is the ComfyUI "API format" workflow: an object whose
//! keys are node IDs and whose values carry a `class_type` and an `inputs`
//! map. Templates are validated when they are loaded so that shape
//! problems surface at the call boundary instead of halfway through
//! parameterization.
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "steps": 20, "model": ["4", 0] }
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// ComfyUI node class types
// ---------------------------------------------------------------------------

const CHECKPOINT_LOADER_CLASS: &str = "CheckpointLoaderSimple";
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";
const KSAMPLER_CLASS: &str = "KSampler";
const KSAMPLER_ADVANCED_CLASS: &str = "KSamplerAdvanced";
const LOAD_IMAGE_CLASS: &str = "LoadImage";
const SAVE_IMAGE_CLASS: &str = "SaveImage";
const PREVIEW_IMAGE_CLASS: &str = "PreviewImage";

/// Input key holding a sampler's random seed.
pub const SEED_INPUT: &str = "seed";

/// Suffix appended to a tool name to form its template filename.
pub const TEMPLATE_FILE_SUFFIX: &str = "_api.json";

// ---------------------------------------------------------------------------
// Node descriptors
// ---------------------------------------------------------------------------

/// Known node kinds, derived from a node's `class_type`.
///
/// Anything not recognised (custom nodes, loaders for other model types)
/// is [`NodeKind::Other`] and is never rejected by the typed accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    CheckpointLoader,
    TextEncode,
    EmptyLatent,
    Sampler,
    LoadImage,
    SaveImage,
    Other,
}

impl NodeKind {
    pub fn from_class_type(class_type: &str) -> Self {
        match class_type {
            CHECKPOINT_LOADER_CLASS => Self::CheckpointLoader,
            CLIP_TEXT_ENCODE_CLASS => Self::TextEncode,
            EMPTY_LATENT_CLASS => Self::EmptyLatent,
            KSAMPLER_CLASS | KSAMPLER_ADVANCED_CLASS => Self::Sampler,
            LOAD_IMAGE_CLASS => Self::LoadImage,
            SAVE_IMAGE_CLASS | PREVIEW_IMAGE_CLASS => Self::SaveImage,
            _ => Self::Other,
        }
    }
}

/// A single node of a job template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDescriptor {
    /// ComfyUI class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    /// Input values. Links to other nodes are `[node_id, output_index]`.
    pub inputs: IndexMap<String, Value>,
    /// Any other keys on the node (such as `_meta`), passed through as-is.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl NodeDescriptor {
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_class_type(&self.class_type)
    }
}

// ---------------------------------------------------------------------------
// JobTemplate
// ---------------------------------------------------------------------------

/// An ordered mapping of node ID to [`NodeDescriptor`].
///
/// Loaded fresh for every tool call; it is mutated in place by the
/// parameterizer and consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobTemplate {
    nodes: IndexMap<String, NodeDescriptor>,
}

impl JobTemplate {
    /// Parse and validate a template from a JSON value.
    pub fn from_value(json: Value) -> Result<Self, CoreError> {
        let Value::Object(obj) = json else {
            return Err(CoreError::InvalidTemplate(
                "template must be a JSON object".to_string(),
            ));
        };

        if obj.is_empty() {
            return Err(CoreError::InvalidTemplate(
                "template must contain at least one node".to_string(),
            ));
        }

        let mut nodes = IndexMap::with_capacity(obj.len());
        for (node_id, node_value) in obj {
            let node = parse_node(&node_id, node_value)?;
            nodes.insert(node_id, node);
        }

        Ok(Self { nodes })
    }

    /// Parse and validate a template from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let json: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::InvalidTemplate(format!("malformed JSON: {e}")))?;
        Self::from_value(json)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(node_id)
    }

    /// Iterate nodes in template order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeDescriptor)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    /// Look up a single input value.
    pub fn input(&self, node_id: &str, key: &str) -> Option<&Value> {
        self.nodes.get(node_id).and_then(|n| n.inputs.get(key))
    }

    /// Overwrite an existing input on an existing node.
    ///
    /// Neither the node nor the input key is created on demand.
    pub fn set_input(&mut self, node_id: &str, key: &str, value: Value) -> Result<(), CoreError> {
        *self.input_mut(node_id, key)? = value;
        Ok(())
    }

    /// Set the `text` input of a text-encode node.
    pub fn set_text(&mut self, node_id: &str, text: &str) -> Result<(), CoreError> {
        self.expect_kind(node_id, NodeKind::TextEncode)?;
        self.set_input(node_id, "text", Value::from(text))
    }

    /// Set `width` and `height` on a latent-image node.
    pub fn set_dimensions(&mut self, node_id: &str, width: u32, height: u32) -> Result<(), CoreError> {
        self.expect_kind(node_id, NodeKind::EmptyLatent)?;
        self.set_input(node_id, "width", Value::from(width))?;
        self.set_input(node_id, "height", Value::from(height))
    }

    /// Set `batch_size` on a latent-image node.
    pub fn set_batch_size(&mut self, node_id: &str, batch_size: u32) -> Result<(), CoreError> {
        self.expect_kind(node_id, NodeKind::EmptyLatent)?;
        self.set_input(node_id, "batch_size", Value::from(batch_size))
    }

    /// Set `ckpt_name` on a checkpoint loader node.
    pub fn set_checkpoint(&mut self, node_id: &str, model: &str) -> Result<(), CoreError> {
        self.expect_kind(node_id, NodeKind::CheckpointLoader)?;
        self.set_input(node_id, "ckpt_name", Value::from(model))
    }

    /// Every `(node_id, seed)` pair in template order.
    pub fn seeds(&self) -> Vec<(&str, u64)> {
        self.nodes
            .iter()
            .filter_map(|(id, node)| {
                node.inputs
                    .get(SEED_INPUT)
                    .and_then(Value::as_u64)
                    .map(|seed| (id.as_str(), seed))
            })
            .collect()
    }

    /// Mutable access to every `seed` input slot.
    pub(crate) fn seed_slots_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.nodes
            .values_mut()
            .filter_map(|node| node.inputs.get_mut(SEED_INPUT))
    }

    /// Serialize back to the JSON document the backend expects.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    // ---- private helpers ----

    fn input_mut(&mut self, node_id: &str, key: &str) -> Result<&mut Value, CoreError> {
        let node = self.nodes.get_mut(node_id).ok_or_else(|| {
            CoreError::Validation(format!("template has no node '{node_id}'"))
        })?;
        node.inputs.get_mut(key).ok_or_else(|| {
            CoreError::Validation(format!("node '{node_id}' has no input '{key}'"))
        })
    }

    /// A node of a known, different kind is rejected; custom nodes pass.
    pub(crate) fn expect_kind(&self, node_id: &str, expected: NodeKind) -> Result<(), CoreError> {
        let node = self.nodes.get(node_id).ok_or_else(|| {
            CoreError::Validation(format!("template has no node '{node_id}'"))
        })?;
        match node.kind() {
            NodeKind::Other => Ok(()),
            kind if kind == expected => Ok(()),
            kind => Err(CoreError::Validation(format!(
                "node '{node_id}' is a {kind:?} ({}), expected {expected:?}",
                node.class_type
            ))),
        }
    }
}

fn parse_node(node_id: &str, value: Value) -> Result<NodeDescriptor, CoreError> {
    let Value::Object(mut obj) = value else {
        return Err(CoreError::InvalidTemplate(format!(
            "node '{node_id}' must be a JSON object"
        )));
    };

    let class_type = match obj.remove("class_type") {
        Some(Value::String(s)) => s,
        _ => {
            return Err(CoreError::InvalidTemplate(format!(
                "node '{node_id}' is missing required 'class_type' field"
            )))
        }
    };

    let inputs: IndexMap<String, Value> = match obj.remove("inputs") {
        Some(Value::Object(map)) => map.into_iter().collect(),
        None => IndexMap::new(),
        Some(_) => {
            return Err(CoreError::InvalidTemplate(format!(
                "node '{node_id}' has non-object 'inputs'"
            )))
        }
    };

    if let Some(seed) = inputs.get(SEED_INPUT) {
        if seed.as_u64().is_none() {
            return Err(CoreError::InvalidTemplate(format!(
                "node '{node_id}' has a non-integer seed: {seed}"
            )));
        }
    }

    Ok(NodeDescriptor {
        class_type,
        inputs,
        extra: obj.into_iter().collect(),
    })
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

/// Loads per-tool templates from a directory of `<tool>_api.json` files.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the template file for `tool`.
    pub fn template_path(&self, tool: &str) -> PathBuf {
        self.dir.join(format!("{tool}{TEMPLATE_FILE_SUFFIX}"))
    }

    /// Read and validate the template for `tool`.
    ///
    /// The file is read on every call so no two calls share a template.
    pub async fn load(&self, tool: &str) -> Result<JobTemplate, CoreError> {
        let path = self.checked_path(tool)?;
        let text = tokio::fs::read_to_string(&path).await;
        Self::finish_load(tool, path, text)
    }

    /// [`load`](Self::load) for synchronous callers such as registration
    /// hooks, which run off the async executor.
    pub fn load_blocking(&self, tool: &str) -> Result<JobTemplate, CoreError> {
        let path = self.checked_path(tool)?;
        let text = std::fs::read_to_string(&path);
        Self::finish_load(tool, path, text)
    }

    // ---- private helpers ----

    fn checked_path(&self, tool: &str) -> Result<PathBuf, CoreError> {
        if tool.is_empty() || tool.contains(['/', '\\']) || tool.starts_with('.') {
            return Err(CoreError::Validation(format!("invalid tool name '{tool}'")));
        }
        Ok(self.template_path(tool))
    }

    fn finish_load(
        tool: &str,
        path: PathBuf,
        text: std::io::Result<String>,
    ) -> Result<JobTemplate, CoreError> {
        let text = match text {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::TemplateNotFound {
                    tool: tool.to_string(),
                    path,
                });
            }
            Err(source) => return Err(CoreError::Io { path, source }),
        };

        let template = JobTemplate::from_json_str(&text).map_err(|e| match e {
            CoreError::InvalidTemplate(msg) => {
                CoreError::InvalidTemplate(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;

        tracing::debug!(tool, nodes = template.len(), "Loaded job template");
        Ok(template)
    }
}
