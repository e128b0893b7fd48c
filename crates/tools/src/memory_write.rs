//! Write tool: writes, appends, directory creation and moves.
//!
//! `content` may be a string (written as text, or decoded first when
//! `encoding` is `base64`) or any JSON value, which is serialized by the
//! target's content type: YAML for `.yaml`/`.yml`, JSON otherwise.

use crate::{ok, op_or, required_str, store_failure, unknown_op};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cybermem_core::error::ToolError;
use cybermem_core::tool::{Tool, ToolResult};
use cybermem_store::{SharedStore, StoreValue};
use tracing::debug;

const NAME: &str = "memory_write";

pub struct MemoryWriteTool {
    store: SharedStore,
}

impl MemoryWriteTool {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

fn content_value(arguments: &serde_json::Value) -> Result<StoreValue, ToolError> {
    let content = &arguments["content"];
    let encoding = arguments["encoding"].as_str().unwrap_or("text");
    match (content, encoding) {
        (serde_json::Value::Null, _) => {
            Err(ToolError::InvalidArguments("Missing 'content' argument".into()))
        }
        (serde_json::Value::String(s), "base64") => STANDARD
            .decode(s)
            .map(StoreValue::Bytes)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid base64 content: {e}"))),
        (serde_json::Value::String(s), "text") => Ok(StoreValue::Text(s.clone())),
        (_, "base64") => Err(ToolError::InvalidArguments(
            "base64 content must be a string".into(),
        )),
        (value, _) => Ok(StoreValue::Structured(value.clone())),
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write, append, create directories or move paths under personal/ and grid/. Paths under the protected subtree are read-only. Inside a transaction every change can be rolled back."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Target store path (the source for op 'move')"
                },
                "op": {
                    "type": "string",
                    "enum": ["write", "append", "mkdir", "move"],
                    "description": "What to do (default: write)"
                },
                "content": {
                    "description": "Text, or a JSON value serialized by the target's type"
                },
                "encoding": {
                    "type": "string",
                    "enum": ["text", "base64"],
                    "description": "How a string content is interpreted (default: text)"
                },
                "to": {
                    "type": "string",
                    "description": "Destination for op 'move'; must not exist"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let op = op_or(&arguments, "write");
        debug!(op, path, "memory_write");

        let result = match op {
            "write" => {
                let value = content_value(&arguments)?;
                let mut store = self.store.lock().await;
                store
                    .write(path, value)
                    .map(|n| ok(format!("Wrote {n} bytes to {path}"), None))
            }
            "append" => {
                let text = required_str(&arguments, "content")?;
                let mut store = self.store.lock().await;
                store
                    .append(path, text)
                    .map(|n| ok(format!("Appended {n} bytes to {path}"), None))
            }
            "mkdir" => {
                let mut store = self.store.lock().await;
                store.mkdir(path).map(|()| ok(format!("Created {path}"), None))
            }
            "move" => {
                let to = required_str(&arguments, "to")?;
                let mut store = self.store.lock().await;
                store
                    .move_path(path, to)
                    .map(|()| ok(format!("Moved {path} to {to}"), None))
            }
            other => return Err(unknown_op(NAME, other)),
        };

        result.or_else(|e| store_failure(NAME, e))
    }
}
