//! Shared domain logic for the ComfyUI tool server.
//!
//! Holds everything that does not talk to the network: job templates and
//! their typed accessors, the parameterizer that prepares a template for
//! submission, and the local capability cache.

pub mod capability;
pub mod error;
pub mod params;
pub mod template;
