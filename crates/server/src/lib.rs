//! ComfyUI tool server: configuration, logging, startup wiring and the
//! transports that expose the registered tools.

pub mod config;
pub mod error;
pub mod response;
pub mod startup;
pub mod state;
pub mod telemetry;
pub mod transport;
