//! Transaction tool: begin, commit and roll back store changes.

use crate::{ok, required_str, store_failure, unknown_op};
use async_trait::async_trait;
use cybermem_core::error::ToolError;
use cybermem_core::tool::{Tool, ToolResult};
use cybermem_store::SharedStore;

const NAME: &str = "memory_transaction";

pub struct MemoryTransactionTool {
    store: SharedStore,
}

impl MemoryTransactionTool {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryTransactionTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Group store changes. 'begin' opens a (nestable) transaction, 'commit' closes the innermost one, 'rollback' undoes everything since the matching begin."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["begin", "commit", "rollback"]
                }
            },
            "required": ["op"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let op = required_str(&arguments, "op")?;
        let mut store = self.store.lock().await;

        let result = match op {
            "begin" => {
                let depth = store.begin();
                Ok(ok(
                    format!("Transaction open (depth {depth})"),
                    Some(serde_json::json!({"depth": depth})),
                ))
            }
            "commit" => store.commit().map(|()| {
                let depth = store.transaction_depth();
                ok(
                    format!("Committed (depth {depth})"),
                    Some(serde_json::json!({"depth": depth})),
                )
            }),
            "rollback" => store.rollback().map(|undone| {
                let depth = store.transaction_depth();
                ok(
                    format!("Rolled back {undone} changes (depth {depth})"),
                    Some(serde_json::json!({"depth": depth, "undone": undone})),
                )
            }),
            other => return Err(unknown_op(NAME, other)),
        };

        result.or_else(|e| store_failure(NAME, e))
    }
}
