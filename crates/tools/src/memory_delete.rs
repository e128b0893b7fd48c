//! Delete tool: removes files and directory trees.
//!
//! Both operations require a `confirm` argument repeating the path exactly.

use crate::{ok, op_or, required_str, store_failure, unknown_op};
use async_trait::async_trait;
use cybermem_core::error::ToolError;
use cybermem_core::tool::{Tool, ToolResult};
use cybermem_store::{ConfirmDelete, SharedStore};
use tracing::info;

const NAME: &str = "memory_delete";

pub struct MemoryDeleteTool {
    store: SharedStore,
}

impl MemoryDeleteTool {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Delete a file (op 'delete') or a directory tree (op 'rmdir'). The 'confirm' argument must repeat 'path' exactly."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Store path to remove"
                },
                "confirm": {
                    "type": "string",
                    "description": "Must equal 'path'"
                },
                "op": {
                    "type": "string",
                    "enum": ["delete", "rmdir"],
                    "description": "File or directory removal (default: delete)"
                }
            },
            "required": ["path", "confirm"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let confirm = required_str(&arguments, "confirm")?;
        if confirm != path {
            return Err(ToolError::InvalidArguments(format!(
                "'confirm' must equal the path '{path}'"
            )));
        }

        let op = op_or(&arguments, "delete");
        let mut store = self.store.lock().await;
        let result = match op {
            "delete" => store.delete(ConfirmDelete::new(path)),
            "rmdir" => store.rmdir(path),
            other => return Err(unknown_op(NAME, other)),
        };

        match result {
            Ok(()) => {
                info!(op, path, "Removed by script");
                Ok(ok(format!("Removed {path}"), None))
            }
            Err(e) => store_failure(NAME, e),
        }
    }
}
