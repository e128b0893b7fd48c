//! Read tool: whole-file reads, line ranges, and file info.

use crate::{ok, op_or, required_str, store_failure, unknown_op};
use async_trait::async_trait;
use cybermem_core::error::ToolError;
use cybermem_core::tool::{Tool, ToolResult};
use cybermem_store::SharedStore;

const NAME: &str = "memory_read";

pub struct MemoryReadTool {
    store: SharedStore,
}

impl MemoryReadTool {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

fn line_arg(arguments: &serde_json::Value, key: &str) -> Result<usize, ToolError> {
    arguments[key]
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a line number")))
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Read a file or directory listing from personal/ or grid/. Use op 'range' with 1-based inclusive start/end lines for large files, or op 'info' for size, line count and content type."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Store path, e.g. personal/notes/todo.md"
                },
                "op": {
                    "type": "string",
                    "enum": ["read", "range", "info"],
                    "description": "What to read (default: read)"
                },
                "start": {
                    "type": "integer",
                    "description": "First line for op 'range' (1-based)"
                },
                "end": {
                    "type": "integer",
                    "description": "Last line for op 'range' (inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let op = op_or(&arguments, "read");
        let mut store = self.store.lock().await;

        let result = match op {
            "read" => store.read(path).map(|content| ok(content, None)),
            "range" => {
                let start = line_arg(&arguments, "start")?;
                let end = line_arg(&arguments, "end")?;
                store.read_range(path, start, end).map(|content| ok(content, None))
            }
            "info" => store.get_info(path).map(|info| {
                let summary = format!(
                    "{} ({}, {} bytes, {} lines)",
                    info.path,
                    info.content_type.mime(),
                    info.size,
                    info.lines.unwrap_or(0)
                );
                ok(summary, serde_json::to_value(&info).ok())
            }),
            other => return Err(unknown_op(NAME, other)),
        };

        result.or_else(|e| store_failure(NAME, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use serde_json::json;

    #[test]
    fn tool_definition() {
        let (_dir, store) = test_support::store();
        let tool = MemoryReadTool::new(store);
        assert_eq!(tool.name(), "memory_read");
        assert_eq!(tool.parameters_schema()["required"], json!(["path"]));
    }

    #[tokio::test]
    async fn read_file() {
        let (dir, store) = test_support::store();
        std::fs::write(dir.path().join("grid/a.md"), "# Title").unwrap();
        let tool = MemoryReadTool::new(store);
        let result = tool.execute(json!({"path": "grid/a.md"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "# Title");
    }

    #[tokio::test]
    async fn read_range() {
        let (dir, store) = test_support::store();
        std::fs::write(dir.path().join("grid/log.txt"), "a\nb\nc\nd\n").unwrap();
        let tool = MemoryReadTool::new(store);
        let result = tool
            .execute(json!({"path": "grid/log.txt", "op": "range", "start": 2, "end": 3}))
            .await
            .unwrap();
        assert_eq!(result.output, "b\nc");
    }

    #[tokio::test]
    async fn oversized_range_is_unsuccessful() {
        let (dir, store) = test_support::store();
        std::fs::write(dir.path().join("grid/log.txt"), "a").unwrap();
        let tool = MemoryReadTool::new(store);
        let result = tool
            .execute(json!({"path": "grid/log.txt", "op": "range", "start": 1, "end": 5000}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("exceeds the maximum"));
    }

    #[tokio::test]
    async fn info_carries_structured_data() {
        let (dir, store) = test_support::store();
        std::fs::write(dir.path().join("personal/n.txt"), "one\ntwo").unwrap();
        let tool = MemoryReadTool::new(store);
        let result = tool
            .execute(json!({"path": "personal/n.txt", "op": "info"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["size"], 7);
        assert_eq!(data["is_dir"], false);
    }

    #[tokio::test]
    async fn missing_file_is_unsuccessful() {
        let (_dir, store) = test_support::store();
        let tool = MemoryReadTool::new(store);
        let result = tool.execute(json!({"path": "grid/nope.txt"})).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Not found"));
    }

    #[tokio::test]
    async fn foreign_namespace_is_denied() {
        let (_dir, store) = test_support::store();
        let tool = MemoryReadTool::new(store);
        let err = tool.execute(json!({"path": "etc/passwd"})).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn range_needs_line_numbers() {
        let (_dir, store) = test_support::store();
        let tool = MemoryReadTool::new(store);
        let err = tool
            .execute(json!({"path": "grid/a", "op": "range"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
