//! Tool trait: the narrow surface handed to the sandboxed script environment.
//!
//! Scripts never touch the store directly: every read, write, move or
//! delete goes through a named tool with a JSON argument object, so the
//! sandbox (subprocess, WASM, embedded interpreter) only needs to speak
//! this contract.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the script environment is told about one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: serde_json::Value,
}

/// One invocation coming in from a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Caller-chosen id, echoed back on the result.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of a store operation as the script sees it.
///
/// `success: false` carries a recoverable store failure (missing file,
/// range too large, ...) in `output`; policy violations never get here
/// and surface as [`ToolError`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Filled in by [`ToolRegistry::execute`].
    pub call_id: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn succeeded(output: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: output.into(),
            data: None,
        }
    }
}

/// One group of store operations (`memory_read`, `memory_write`, ...).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    /// Run with an argument object; the registry has already checked it is one.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tools a script may call, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Dispatch a call and stamp its id on the result.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        if !call.arguments.is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "{} expects a JSON object of arguments",
                call.name
            )));
        }
        let mut result = tool.execute(call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// Read-only tool over an in-memory file map.
    struct MapReadTool {
        files: HashMap<&'static str, &'static str>,
    }

    impl MapReadTool {
        fn new() -> Self {
            Self {
                files: HashMap::from([("grid/board/post.md", "# Hello grid")]),
            }
        }
    }

    #[async_trait]
    impl Tool for MapReadTool {
        fn name(&self) -> &str {
            "memory_read"
        }

        fn description(&self) -> &str {
            "Read a store path"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })
        }

        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let path = arguments["path"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
            Ok(match self.files.get(path) {
                Some(content) => ToolResult::succeeded(*content, None),
                None => ToolResult::failed(format!("Not found: {path}")),
            })
        }
    }

    struct NoopTool(&'static str);

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "Does nothing"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::succeeded("", None))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NoopTool("memory_write")));
        registry.register(Box::new(MapReadTool::new()));
        registry.register(Box::new(NoopTool("memory_delete")));
        registry
    }

    #[test]
    fn definitions_are_name_ordered() {
        let names: Vec<String> = registry().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["memory_delete", "memory_read", "memory_write"]);
    }

    #[test]
    fn reregistering_replaces() {
        let mut registry = registry();
        registry.register(Box::new(NoopTool("memory_read")));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[1].description, "Does nothing");
    }

    #[tokio::test]
    async fn execute_stamps_call_id() {
        let call = ToolCall::new("call_7", "memory_read", json!({"path": "grid/board/post.md"}));
        let result = registry().execute(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.call_id, "call_7");
        assert_eq!(result.output, "# Hello grid");
    }

    #[tokio::test]
    async fn store_failure_is_an_unsuccessful_result() {
        let call = ToolCall::new("call_8", "memory_read", json!({"path": "grid/missing.md"}));
        let result = registry().execute(&call).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.call_id, "call_8");
        assert_eq!(result.output, "Not found: grid/missing.md");
    }

    #[tokio::test]
    async fn non_object_arguments_rejected() {
        let call = ToolCall::new("c", "memory_read", json!("grid/board/post.md"));
        let err = registry().execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unknown_tool_not_found() {
        let call = ToolCall::new("c", "shell_exec", json!({}));
        let err = registry().execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "shell_exec"));
    }
}
