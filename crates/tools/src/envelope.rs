//! Call-envelope logging.
//!
//! Every tool and resource call is bracketed by [`CallEvent`]s: one
//! `Call` on entry, then exactly one `Result` or `Error` on exit. Suspending
//! operations go through [`instrument`], blocking ones through
//! [`instrument_blocking`]; both open and close the same [`Envelope`], so
//! what gets recorded does not depend on the calling convention.
//!
//! Errors are recorded and handed back to the caller untouched.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::handler::{ResourceDescriptor, ResourceHandler, ToolDescriptor, ToolHandler};

/// Longest recorded result, in characters.
pub const MAX_RESULT_CHARS: usize = 1000;

const ELLIPSIS: &str = "...";

/// Argument key naming the receiver, never recorded.
const RECEIVER_KEY: &str = "self";

// ---------------------------------------------------------------------------
// Events and sinks
// ---------------------------------------------------------------------------

/// One entry in a call's log.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Call {
        tool: String,
        args: Value,
    },
    Result {
        tool: String,
        /// Truncated with [`truncate_result`].
        result: String,
        elapsed_ms: u64,
    },
    Error {
        tool: String,
        message: String,
        elapsed_ms: u64,
    },
}

/// Destination for call events.
pub trait CallSink: Send + Sync {
    fn record(&self, event: CallEvent);
}

/// Emits call events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CallSink for TracingSink {
    fn record(&self, event: CallEvent) {
        match event {
            CallEvent::Call { tool, args } => {
                tracing::info!(
                    mcp_call = %json!({ "tool": tool, "args": args }),
                    "MCP call: {tool}",
                );
            }
            CallEvent::Result {
                tool,
                result,
                elapsed_ms,
            } => {
                tracing::info!(
                    mcp_result = %json!({ "tool": tool, "result": result }),
                    execution_time_ms = elapsed_ms,
                    "MCP result: {tool}",
                );
            }
            CallEvent::Error {
                tool,
                message,
                elapsed_ms,
            } => {
                tracing::error!(
                    tool = %tool,
                    execution_time_ms = elapsed_ms,
                    error = %message,
                    "MCP tool {tool} failed: {message}",
                );
            }
        }
    }
}

/// Keeps call events in memory, in the order they were recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CallEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CallEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CallSink for RecordingSink {
    fn record(&self, event: CallEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Cut `s` to at most [`MAX_RESULT_CHARS`] characters, ending in `...` when
/// anything was dropped.
pub fn truncate_result(s: &str) -> String {
    if s.chars().count() <= MAX_RESULT_CHARS {
        return s.to_string();
    }
    let keep = MAX_RESULT_CHARS - ELLIPSIS.len();
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Arguments as a JSON object with the receiver key removed.
fn recorded_args(args: &Value) -> Value {
    match args {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove(RECEIVER_KEY);
            Value::Object(map)
        }
        Value::Null => Value::Object(Map::new()),
        other => json!({ "args": other }),
    }
}

/// An open call: `Call` has been recorded, the outcome has not.
struct Envelope<'a> {
    tool: &'a str,
    sink: &'a dyn CallSink,
    started: Instant,
}

impl<'a> Envelope<'a> {
    fn open(tool: &'a str, args: &Value, sink: &'a dyn CallSink) -> Self {
        sink.record(CallEvent::Call {
            tool: tool.to_string(),
            args: recorded_args(args),
        });
        Self {
            tool,
            sink,
            started: Instant::now(),
        }
    }

    fn close<T: Display, E: Display>(self, outcome: &Result<T, E>) {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let event = match outcome {
            Ok(value) => CallEvent::Result {
                tool: self.tool.to_string(),
                result: truncate_result(&value.to_string()),
                elapsed_ms,
            },
            Err(e) => CallEvent::Error {
                tool: self.tool.to_string(),
                message: e.to_string(),
                elapsed_ms,
            },
        };
        self.sink.record(event);
    }
}

/// Run a suspending operation inside a call envelope.
pub async fn instrument<T, E, F>(tool: &str, args: &Value, sink: &dyn CallSink, op: F) -> Result<T, E>
where
    T: Display,
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let envelope = Envelope::open(tool, args, sink);
    let outcome = op.await;
    envelope.close(&outcome);
    outcome
}

/// Run a blocking operation inside a call envelope.
pub fn instrument_blocking<T, E, F>(tool: &str, args: &Value, sink: &dyn CallSink, op: F) -> Result<T, E>
where
    T: Display,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let envelope = Envelope::open(tool, args, sink);
    let outcome = op();
    envelope.close(&outcome);
    outcome
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

/// A tool whose calls are recorded. Describes itself exactly like the
/// wrapped tool.
pub struct LoggedTool {
    inner: Arc<dyn ToolHandler>,
    sink: Arc<dyn CallSink>,
    name: String,
}

impl LoggedTool {
    pub fn new(inner: Arc<dyn ToolHandler>, sink: Arc<dyn CallSink>) -> Self {
        let name = inner.descriptor().name;
        Self { inner, sink, name }
    }
}

#[async_trait]
impl ToolHandler for LoggedTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.inner.descriptor()
    }

    fn bound_args(&self, args: &Value) -> Value {
        self.inner.bound_args(args)
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        let bound = self.inner.bound_args(&args);
        instrument(&self.name, &bound, self.sink.as_ref(), self.inner.call(args)).await
    }
}

/// A resource whose reads are recorded under its URI.
pub struct LoggedResource {
    inner: Arc<dyn ResourceHandler>,
    sink: Arc<dyn CallSink>,
    uri: String,
}

impl LoggedResource {
    pub fn new(inner: Arc<dyn ResourceHandler>, sink: Arc<dyn CallSink>) -> Self {
        let uri = inner.descriptor().uri;
        Self { inner, sink, uri }
    }
}

#[async_trait]
impl ResourceHandler for LoggedResource {
    fn descriptor(&self) -> ResourceDescriptor {
        self.inner.descriptor()
    }

    async fn read(&self) -> Result<String, ToolError> {
        instrument(&self.uri, &Value::Null, self.sink.as_ref(), self.inner.read()).await
    }
}
