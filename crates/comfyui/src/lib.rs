//! ComfyUI REST client and job orchestration.
//!
//! Provides the HTTP API wrapper, typed parsing of the history endpoint,
//! the submit-then-poll job runner, and synchronisation of the local
//! capability cache.

pub mod api;
pub mod history;
pub mod orchestrator;
pub mod sync;
