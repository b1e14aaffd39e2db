//! Tool dispatch surface for the ComfyUI tool server.
//!
//! - [`handler`] defines the [`ToolHandler`](handler::ToolHandler) and
//!   [`ResourceHandler`](handler::ResourceHandler) traits and the
//!   [`ToolSet`](handler::ToolSet) that callers dispatch through.
//! - [`envelope`] records every call, result and failure.
//! - [`registry`] runs each module's registration hook at startup.
//! - [`modules`] holds the built-in tools and the manifest listing them.

pub mod context;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod modules;
pub mod registry;
