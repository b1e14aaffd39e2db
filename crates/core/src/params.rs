//! Job parameterization.
//!
//! Prepares a freshly loaded [`JobTemplate`] for submission: every `seed`
//! input is replaced with a new random value, and caller-supplied fields
//! (prompt text, dimensions, batch size, checkpoint) are written into the
//! nodes a tool declares through its [`NodeBindings`].

use rand::Rng;
use serde_json::Value;

use crate::error::CoreError;
use crate::template::{JobTemplate, NodeKind};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Smallest generated seed (10^14, the smallest 15-digit integer).
pub const SEED_MIN: u64 = 100_000_000_000_000;

/// Largest generated seed (10^15 - 1).
pub const SEED_MAX: u64 = 999_999_999_999_999;

/// Maximum images per job.
pub const MAX_BATCH_SIZE: u32 = 4;

/// Smallest accepted image edge in pixels.
pub const MIN_DIMENSION: u32 = 64;

/// Largest accepted image edge in pixels.
pub const MAX_DIMENSION: u32 = 8192;

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// A uniformly random 15-digit seed.
pub fn random_seed() -> u64 {
    rand::rng().random_range(SEED_MIN..=SEED_MAX)
}

/// Replace every `seed` input in the template with a fresh random value.
///
/// Returns the number of seeds replaced.
pub fn randomize_seeds(template: &mut JobTemplate) -> usize {
    let mut rng = rand::rng();
    let mut count = 0;
    for slot in template.seed_slots_mut() {
        *slot = Value::from(rng.random_range(SEED_MIN..=SEED_MAX));
        count += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Fields and bindings
// ---------------------------------------------------------------------------

/// A well-known, caller-settable template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Prompt,
    NegativePrompt,
    Width,
    Height,
    BatchSize,
    Model,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Prompt,
        Field::NegativePrompt,
        Field::Width,
        Field::Height,
        Field::BatchSize,
        Field::Model,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Prompt => "prompt",
            Field::NegativePrompt => "negative_prompt",
            Field::Width => "width",
            Field::Height => "height",
            Field::BatchSize => "batch_size",
            Field::Model => "model",
        }
    }

    /// Input key the field is written to on its bound node.
    pub fn input_key(self) -> &'static str {
        match self {
            Field::Prompt | Field::NegativePrompt => "text",
            Field::Width => "width",
            Field::Height => "height",
            Field::BatchSize => "batch_size",
            Field::Model => "ckpt_name",
        }
    }

    fn node_kind(self) -> NodeKind {
        match self {
            Field::Prompt | Field::NegativePrompt => NodeKind::TextEncode,
            Field::Width | Field::Height | Field::BatchSize => NodeKind::EmptyLatent,
            Field::Model => NodeKind::CheckpointLoader,
        }
    }
}

/// Which template node each field lives on, for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeBindings {
    prompt: Option<String>,
    negative_prompt: Option<String>,
    latent: Option<String>,
    checkpoint: Option<String>,
}

impl NodeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, node_id: impl Into<String>) -> Self {
        self.prompt = Some(node_id.into());
        self
    }

    pub fn negative_prompt(mut self, node_id: impl Into<String>) -> Self {
        self.negative_prompt = Some(node_id.into());
        self
    }

    /// Bind width, height and batch size to one latent-image node.
    pub fn latent(mut self, node_id: impl Into<String>) -> Self {
        self.latent = Some(node_id.into());
        self
    }

    pub fn checkpoint(mut self, node_id: impl Into<String>) -> Self {
        self.checkpoint = Some(node_id.into());
        self
    }

    pub fn node_for(&self, field: Field) -> Option<&str> {
        match field {
            Field::Prompt => self.prompt.as_deref(),
            Field::NegativePrompt => self.negative_prompt.as_deref(),
            Field::Width | Field::Height | Field::BatchSize => self.latent.as_deref(),
            Field::Model => self.checkpoint.as_deref(),
        }
    }

    pub fn accepts(&self, field: Field) -> bool {
        self.node_for(field).is_some()
    }
}

/// Check that every bound field points at an existing node and input.
///
/// Run once per tool at registration time so a mismatch between a tool
/// and its template is reported at startup rather than on every call.
pub fn validate_bindings(template: &JobTemplate, bindings: &NodeBindings) -> Result<(), CoreError> {
    for field in Field::ALL {
        let Some(node_id) = bindings.node_for(field) else {
            continue;
        };

        if template.node(node_id).is_none() {
            return Err(CoreError::InvalidBinding {
                field: field.name(),
                reason: format!("template has no node '{node_id}'"),
            });
        }

        if template.input(node_id, field.input_key()).is_none() {
            return Err(CoreError::InvalidBinding {
                field: field.name(),
                reason: format!("node '{node_id}' has no input '{}'", field.input_key()),
            });
        }

        template
            .expect_kind(node_id, field.node_kind())
            .map_err(|e| CoreError::InvalidBinding {
                field: field.name(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JobParameters
// ---------------------------------------------------------------------------

/// Caller-supplied overrides. `None` keeps the template's built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobParameters {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub batch_size: Option<u32>,
    pub model: Option<String>,
}

impl JobParameters {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(prompt) = &self.prompt {
            if prompt.trim().is_empty() {
                return Err(CoreError::Validation("prompt must not be empty".to_string()));
            }
        }

        for (name, value) in [("width", self.width), ("height", self.height)] {
            if let Some(v) = value {
                if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&v) {
                    return Err(CoreError::Validation(format!(
                        "{name} must be between {MIN_DIMENSION} and {MAX_DIMENSION}, got {v}"
                    )));
                }
            }
        }

        if let Some(n) = self.batch_size {
            if !(1..=MAX_BATCH_SIZE).contains(&n) {
                return Err(CoreError::Validation(format!(
                    "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {n}"
                )));
            }
        }

        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(CoreError::Validation("model must not be empty".to_string()));
            }
        }

        Ok(())
    }

    fn value_for(&self, field: Field) -> Option<Value> {
        match field {
            Field::Prompt => self.prompt.as_deref().map(Value::from),
            Field::NegativePrompt => self.negative_prompt.as_deref().map(Value::from),
            Field::Width => self.width.map(Value::from),
            Field::Height => self.height.map(Value::from),
            Field::BatchSize => self.batch_size.map(Value::from),
            Field::Model => self.model.as_deref().map(Value::from),
        }
    }
}

/// Write every supplied parameter into its bound node.
///
/// Applying the same parameters twice leaves the template unchanged after
/// the first application.
pub fn apply_parameters(
    template: &mut JobTemplate,
    bindings: &NodeBindings,
    params: &JobParameters,
) -> Result<(), CoreError> {
    params.validate()?;

    for field in Field::ALL {
        let Some(value) = params.value_for(field) else {
            continue;
        };
        let node_id = bindings.node_for(field).ok_or_else(|| {
            CoreError::Validation(format!("this tool does not accept '{}'", field.name()))
        })?;
        template.expect_kind(node_id, field.node_kind())?;
        template.set_input(node_id, field.input_key(), value)?;
    }
    Ok(())
}
