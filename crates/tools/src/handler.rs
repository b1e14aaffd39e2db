//! Tool and resource handlers, and the dispatch surface that holds them.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::envelope::{CallSink, LoggedResource, LoggedTool};
use crate::error::{RegistrationError, ToolError};

/// How a tool presents itself to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub input_schema: Value,
}

/// How a resource presents itself to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// A remotely invokable operation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// The arguments a call actually runs with, defaults applied. This is
    /// what the call envelope records.
    fn bound_args(&self, args: &Value) -> Value {
        args.clone()
    }

    /// Run the tool with a JSON argument object and return its text output.
    async fn call(&self, args: Value) -> Result<String, ToolError>;
}

/// A read-only document addressed by URI.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn descriptor(&self) -> ResourceDescriptor;

    async fn read(&self) -> Result<String, ToolError>;
}

/// Every registered tool and resource, keyed by name and URI.
///
/// Built once at startup, then shared read-only. Each handler is wrapped in
/// a call envelope on insertion, so every dispatch through the set is
/// recorded by its sink.
#[derive(Clone)]
pub struct ToolSet {
    tools: IndexMap<String, Arc<dyn ToolHandler>>,
    resources: IndexMap<String, Arc<dyn ResourceHandler>>,
    sink: Arc<dyn CallSink>,
}

impl ToolSet {
    pub fn new(sink: Arc<dyn CallSink>) -> Self {
        Self {
            tools: IndexMap::new(),
            resources: IndexMap::new(),
            sink,
        }
    }

    /// Register a tool under its descriptor name.
    pub fn add_tool(&mut self, tool: Arc<dyn ToolHandler>) -> Result<(), RegistrationError> {
        let name = tool.descriptor().name;
        if self.tools.contains_key(&name) {
            return Err(RegistrationError::Duplicate { kind: "tool", name });
        }
        let logged = LoggedTool::new(tool, Arc::clone(&self.sink));
        self.tools.insert(name, Arc::new(logged));
        Ok(())
    }

    /// Register a resource under its descriptor URI.
    pub fn add_resource(
        &mut self,
        resource: Arc<dyn ResourceHandler>,
    ) -> Result<(), RegistrationError> {
        let uri = resource.descriptor().uri;
        if self.resources.contains_key(&uri) {
            return Err(RegistrationError::Duplicate {
                kind: "resource",
                name: uri,
            });
        }
        let logged = LoggedResource::new(resource, Arc::clone(&self.sink));
        self.resources.insert(uri, Arc::new(logged));
        Ok(())
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Descriptors in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub fn list_resources(&self) -> Vec<ResourceDescriptor> {
        self.resources.values().map(|r| r.descriptor()).collect()
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(args).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<String, ToolError> {
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| ToolError::UnknownResource(uri.to_string()))?;
        resource.read().await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::envelope::{CallEvent, RecordingSink};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "Echo the prompt".into(),
                input_schema: json!({ "type": "object" }),
            }
        }

        async fn call(&self, args: Value) -> Result<String, ToolError> {
            Ok(args["prompt"].as_str().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn duplicate_tool_is_rejected() {
        let mut set = ToolSet::new(Arc::new(RecordingSink::new()));
        set.add_tool(Arc::new(Echo)).unwrap();
        assert_matches!(
            set.add_tool(Arc::new(Echo)),
            Err(RegistrationError::Duplicate { kind: "tool", name }) if name == "echo"
        );
        assert_eq!(set.tool_count(), 1);
    }

    #[tokio::test]
    async fn dispatch_goes_through_the_envelope() {
        let sink = Arc::new(RecordingSink::new());
        let mut set = ToolSet::new(sink.clone());
        set.add_tool(Arc::new(Echo)).unwrap();

        let out = set.call_tool("echo", json!({ "prompt": "hi" })).await.unwrap();
        assert_eq!(out, "hi");
        assert_eq!(set.list_tools()[0].name, "echo");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_matches!(&events[1], CallEvent::Result { result, .. } if result == "hi");
    }

    #[tokio::test]
    async fn unknown_names_are_reported() {
        let set = ToolSet::new(Arc::new(RecordingSink::new()));
        assert_matches!(
            set.call_tool("nope", Value::Null).await,
            Err(ToolError::UnknownTool(name)) if name == "nope"
        );
        assert_matches!(
            set.read_resource("info://nope").await,
            Err(ToolError::UnknownResource(_))
        );
    }
}
