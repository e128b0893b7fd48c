//! Store tools for the cybermem script environment.
//!
//! Scripts get exactly four tools, all sharing one store handle:
//!
//! | Tool | Operations |
//! |------|------------|
//! | `memory_read` | read, range, info |
//! | `memory_write` | write, append, mkdir, move |
//! | `memory_delete` | delete, rmdir (both need `confirm` equal to `path`) |
//! | `memory_transaction` | begin, commit, rollback |
//!
//! Policy violations (`PermissionDenied`) surface as tool errors; every other
//! store failure comes back as an unsuccessful [`ToolResult`] so the script
//! can inspect it and carry on.

pub mod memory_delete;
pub mod memory_read;
pub mod memory_transaction;
pub mod memory_write;

use cybermem_core::error::{StoreError, ToolError};
use cybermem_core::tool::{ToolRegistry, ToolResult};
use cybermem_store::SharedStore;

pub use memory_delete::MemoryDeleteTool;
pub use memory_read::MemoryReadTool;
pub use memory_transaction::MemoryTransactionTool;
pub use memory_write::MemoryWriteTool;

/// Create a registry holding the four store tools over `store`.
pub fn default_registry(store: SharedStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MemoryReadTool::new(store.clone())));
    registry.register(Box::new(MemoryWriteTool::new(store.clone())));
    registry.register(Box::new(MemoryDeleteTool::new(store.clone())));
    registry.register(Box::new(MemoryTransactionTool::new(store)));
    registry
}

// ── Shared argument and result helpers ──────────────────────────────────

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn op_or<'a>(arguments: &'a serde_json::Value, default: &'a str) -> &'a str {
    arguments["op"].as_str().unwrap_or(default)
}

fn unknown_op(tool_name: &str, op: &str) -> ToolError {
    ToolError::InvalidArguments(format!("Unknown op '{op}' for {tool_name}"))
}

fn ok(output: impl Into<String>, data: Option<serde_json::Value>) -> ToolResult {
    ToolResult::succeeded(output, data)
}

/// Map a store failure: policy violations are tool errors, the rest are
/// unsuccessful results.
fn store_failure(tool_name: &str, error: StoreError) -> Result<ToolResult, ToolError> {
    match error {
        StoreError::PermissionDenied { .. } => Err(ToolError::PermissionDenied {
            tool_name: tool_name.into(),
            reason: error.to_string(),
        }),
        other => Ok(ToolResult::failed(other.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use cybermem_security::NamespaceRoots;
    use cybermem_store::{SharedStore, StoreOptions, TransactionalStore};
    use tempfile::TempDir;

    pub fn store() -> (TempDir, SharedStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("personal/.internal")).unwrap();
        std::fs::create_dir_all(dir.path().join("grid")).unwrap();
        let store = TransactionalStore::new(
            NamespaceRoots::under(dir.path()),
            StoreOptions::under(dir.path()),
        )
        .shared();
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cybermem_core::tool::ToolCall;

    #[test]
    fn registry_has_the_four_store_tools() {
        let (_dir, store) = test_support::store();
        let registry = default_registry(store);
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["memory_delete", "memory_read", "memory_transaction", "memory_write"]
        );
    }

    #[tokio::test]
    async fn tools_share_one_store() {
        let (_dir, store) = test_support::store();
        let registry = default_registry(store);

        let call = |name: &str, arguments: serde_json::Value| ToolCall::new("c", name, arguments);
        registry
            .execute(&call("memory_write", serde_json::json!({"path": "grid/x.txt", "content": "hi"})))
            .await
            .unwrap();
        let read = registry
            .execute(&call("memory_read", serde_json::json!({"path": "grid/x.txt"})))
            .await
            .unwrap();
        assert!(read.success);
        assert_eq!(read.call_id, "c");
        assert_eq!(read.output, "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (_dir, store) = test_support::store();
        let registry = default_registry(store);
        let err = registry
            .execute(&ToolCall::new("c", "shell", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
