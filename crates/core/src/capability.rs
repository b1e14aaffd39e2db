//! Local cache of the backend's node capability description.
//!
//! ComfyUI describes every node type it supports at `GET /api/object_info`.
//! The response is cached on disk per backend (`<host>_<port>_object_info.json`)
//! and read back by tools that need to list valid parameter values, such as
//! the installed checkpoints.
//!
//! A missing cache is a degraded state, not an error: [`CapabilityStore::load`]
//! returns `None` and callers explain the situation to the user.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Node type whose `ckpt_name` input lists the installed checkpoints.
pub const CHECKPOINT_NODE: &str = "CheckpointLoaderSimple";

/// Input on [`CHECKPOINT_NODE`] holding the checkpoint choices.
pub const CHECKPOINT_INPUT: &str = "ckpt_name";

/// Suffix of cache filenames.
const CACHE_FILE_SUFFIX: &str = "_object_info.json";

// ---------------------------------------------------------------------------
// CapabilityMap
// ---------------------------------------------------------------------------

/// Parsed capability description, keyed by node type name.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityMap(Map<String, Value>);

/// Installed checkpoints as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOptions {
    pub models: Vec<String>,
    /// Human-readable description of the input, when the backend provides one.
    pub tooltip: Option<String>,
}

/// Why a lookup in the capability map came up empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityLookupError {
    #[error("Node '{0}' was not found, so the model list is unavailable")]
    MissingNode(String),

    #[error("Field '{field}' was not found on node '{node}'")]
    MissingField { node: String, field: String },
}

impl CapabilityMap {
    pub fn from_value(json: Value) -> Result<Self, CoreError> {
        match json {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(CoreError::Validation(
                "capability description must be a JSON object".to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Description of a single node type.
    pub fn get(&self, node_type: &str) -> Option<&Value> {
        self.0.get(node_type)
    }

    /// Installed checkpoints and their tooltip.
    ///
    /// Expects `CheckpointLoaderSimple.input.required.ckpt_name` to be a
    /// two-element array: the list of model names, then a descriptor map.
    pub fn checkpoint_options(&self) -> Result<CheckpointOptions, CapabilityLookupError> {
        let node = self
            .0
            .get(CHECKPOINT_NODE)
            .ok_or_else(|| CapabilityLookupError::MissingNode(CHECKPOINT_NODE.to_string()))?;

        let missing = |field: &str| CapabilityLookupError::MissingField {
            node: CHECKPOINT_NODE.to_string(),
            field: field.to_string(),
        };

        let ckpt = node
            .get("input")
            .ok_or_else(|| missing("input"))?
            .get("required")
            .ok_or_else(|| missing("required"))?
            .get(CHECKPOINT_INPUT)
            .ok_or_else(|| missing(CHECKPOINT_INPUT))?;

        let models = ckpt
            .get(0)
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tooltip = ckpt
            .get(1)
            .and_then(|desc| desc.get("tooltip"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(CheckpointOptions { models, tooltip })
    }
}

// ---------------------------------------------------------------------------
// CapabilityStore
// ---------------------------------------------------------------------------

/// On-disk location of the capability cache for one backend.
#[derive(Debug, Clone)]
pub struct CapabilityStore {
    dir: PathBuf,
    host: String,
    port: u16,
}

impl CapabilityStore {
    pub fn new(dir: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            dir: dir.into(),
            host: host.into(),
            port,
        }
    }

    /// `<dir>/<host>_<port>_object_info.json`
    pub fn path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_{}{CACHE_FILE_SUFFIX}", self.host, self.port))
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(self.path())
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Read the cache, or `None` if it is absent or unreadable.
    pub async fn load(&self) -> Option<CapabilityMap> {
        let path = self.path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Capability cache unavailable");
                return None;
            }
        };

        let parsed = serde_json::from_str::<Value>(&text)
            .map_err(|e| CoreError::Validation(e.to_string()))
            .and_then(CapabilityMap::from_value);

        match parsed {
            Ok(map) => {
                tracing::debug!(path = %path.display(), node_types = map.len(), "Loaded capability cache");
                Some(map)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Capability cache is not valid JSON");
                None
            }
        }
    }

    /// Write a capability description fetched from the backend.
    pub async fn save(&self, json: &Value) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path();
        let text = serde_json::to_string_pretty(json)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize capability cache: {e}")))?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|source| CoreError::Io { path, source })
    }
}
