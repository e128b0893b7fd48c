//! End-to-end integration tests for the cybermem working-memory pipeline.
//!
//! These tests drive the store through the script tool surface, assemble
//! context with the working-memory facade, hand it to a scripted reasoner,
//! and checkpoint/restore across "runs".

use std::sync::Mutex;

use cybermem_agent::{SelectionStrategy, WorkingMemory};
use cybermem_config::AppConfig;
use cybermem_core::error::ReasonerError;
use cybermem_core::reasoner::{Reasoner, ReasonerRequest, ReasonerResponse};
use cybermem_core::tool::{ToolCall, ToolRegistry};
use cybermem_core::{ContentType, MemoryItem, Priority};
use cybermem_tools::default_registry;
use serde_json::json;
use tempfile::TempDir;

// ── Mock Reasoner ────────────────────────────────────────────────────────

/// Records every request and answers with the ids it was shown.
struct RecordingReasoner {
    requests: Mutex<Vec<ReasonerRequest>>,
}

impl RecordingReasoner {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    fn last(&self) -> ReasonerRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl Reasoner for RecordingReasoner {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn reason(&self, request: ReasonerRequest) -> Result<ReasonerResponse, ReasonerError> {
        let ids: Vec<serde_json::Value> = request
            .context
            .as_array()
            .map(|entries| entries.iter().map(|e| e["id"].clone()).collect())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);
        Ok(ReasonerResponse::new(json!({ "seen": ids })))
    }
}

/// A reasoner whose wait is always aborted by shutdown.
struct ShutdownReasoner;

#[async_trait::async_trait]
impl Reasoner for ShutdownReasoner {
    fn name(&self) -> &str {
        "shutdown"
    }

    async fn reason(&self, _request: ReasonerRequest) -> Result<ReasonerResponse, ReasonerError> {
        Ok(ReasonerResponse::cancelled())
    }
}

/// A reasoner whose channel is down.
struct OfflineReasoner;

#[async_trait::async_trait]
impl Reasoner for OfflineReasoner {
    fn name(&self) -> &str {
        "offline"
    }

    async fn reason(&self, _request: ReasonerRequest) -> Result<ReasonerResponse, ReasonerError> {
        Err(ReasonerError::RequestFailed("channel closed".into()))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn workspace() -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("personal/.internal")).unwrap();
    std::fs::create_dir_all(dir.path().join("grid")).unwrap();
    std::fs::write(
        dir.path().join("personal/.internal/identity.json"),
        r#"{"name": "cyber"}"#,
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.store.base_dir = Some(dir.path().to_path_buf());
    (dir, config)
}

async fn call(registry: &ToolRegistry, name: &str, arguments: serde_json::Value) -> (bool, String) {
    let result = registry
        .execute(&ToolCall::new("call_1", name, arguments))
        .await
        .unwrap();
    (result.success, result.output)
}

fn seen(response: &ReasonerResponse) -> Vec<String> {
    response.output["seen"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn script_writes_reach_the_reasoner() {
    let (_dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    assert_eq!(memory.bootstrap().await, 3);
    let tools = default_registry(memory.store());

    let (ok, _) = call(
        &tools,
        "memory_write",
        json!({"path": "personal/notes/parser.md", "content": "The YAML parser drops anchors."}),
    )
    .await;
    assert!(ok);

    let reasoner = RecordingReasoner::new();
    let response = memory.ask(&reasoner, "Fix the YAML parser").await.unwrap();
    let ids = seen(&response);
    assert!(ids.contains(&"personal/notes/parser.md".to_string()));
    assert!(ids.contains(&"personal/.internal/identity.json".to_string()));

    let request = reasoner.last();
    let entry = request
        .context
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"] == "personal/notes/parser.md")
        .unwrap()
        .clone();
    assert_eq!(entry["content"], "The YAML parser drops anchors.");
    assert_eq!(entry["content_type"], "text/markdown");
}

#[tokio::test]
async fn rolled_back_transaction_leaves_no_trace() {
    let (dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    let tools = default_registry(memory.store());

    call(&tools, "memory_write", json!({"path": "grid/board/post.md", "content": "v1"})).await;

    call(&tools, "memory_transaction", json!({"op": "begin"})).await;
    call(&tools, "memory_write", json!({"path": "grid/board/post.md", "content": "v2"})).await;
    call(&tools, "memory_write", json!({"path": "grid/board/draft.md", "content": "wip"})).await;
    call(
        &tools,
        "memory_delete",
        json!({"op": "rmdir", "path": "grid/board", "confirm": "grid/board"}),
    )
    .await;
    assert!(!dir.path().join("grid/board").exists());

    let (ok, output) = call(&tools, "memory_transaction", json!({"op": "rollback"})).await;
    assert!(ok, "{output}");

    assert_eq!(
        std::fs::read_to_string(dir.path().join("grid/board/post.md")).unwrap(),
        "v1"
    );
    assert!(!dir.path().join("grid/board/draft.md").exists());

    // The cache was invalidated, so reads see the restored content.
    let (_, content) = call(&tools, "memory_read", json!({"path": "grid/board/post.md"})).await;
    assert_eq!(content, "v1");

    let store = memory.store();
    let store = store.lock().await;
    assert!(!store.registry().contains("grid/board/draft.md"));
}

#[tokio::test]
async fn nested_commit_registers_only_at_outermost() {
    let (_dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    let tools = default_registry(memory.store());

    call(&tools, "memory_transaction", json!({"op": "begin"})).await;
    call(&tools, "memory_transaction", json!({"op": "begin"})).await;
    call(&tools, "memory_write", json!({"path": "personal/plan.yaml", "content": {"steps": [1, 2]}})).await;
    call(&tools, "memory_transaction", json!({"op": "commit"})).await;
    assert!(!memory.store().lock().await.registry().contains("personal/plan.yaml"));

    call(&tools, "memory_transaction", json!({"op": "commit"})).await;
    let store = memory.store();
    let store = store.lock().await;
    let block = store.registry().get("personal/plan.yaml").unwrap();
    assert_eq!(block.content_type(), ContentType::Yaml);
}

#[tokio::test]
async fn protected_identity_is_read_only_for_scripts() {
    let (_dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    let tools = default_registry(memory.store());

    let (ok, content) = call(
        &tools,
        "memory_read",
        json!({"path": "/personal/.internal/identity.json"}),
    )
    .await;
    assert!(ok);
    assert!(content.contains("cyber"));

    let err = tools
        .execute(&ToolCall::new(
            "call_2",
            "memory_write",
            json!({"path": "personal/.internal/identity.json", "content": "{}"}),
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Permission denied"));
}

#[tokio::test]
async fn checkpoint_survives_restart() {
    let (_dir, config) = workspace();
    {
        let mut memory = WorkingMemory::open(&config).unwrap();
        memory.bootstrap().await;
        memory.set_task(Some("refactor-loader".into()));
        memory.set_active_topics(vec!["cache".into()]);
        let tools = default_registry(memory.store());
        call(&tools, "memory_write", json!({"path": "personal/cache.md", "content": "ttl 300s"})).await;
        memory
            .store()
            .lock()
            .await
            .registry_mut()
            .set_priority("personal/cache.md", Priority::High);
        memory.checkpoint().await.unwrap();
    }

    let mut memory = WorkingMemory::open(&config).unwrap();
    assert_eq!(memory.restore().await, 4);
    assert_eq!(memory.current_task_id(), Some("refactor-loader"));

    let store = memory.store();
    let store = store.lock().await;
    let block = store.registry().get("personal/cache.md").unwrap();
    assert_eq!(block.priority(), Priority::High);
    assert!(store.registry().get("personal").unwrap().pinned());
}

#[tokio::test]
async fn budget_pressure_keeps_pinned_and_relevant() {
    let (dir, config) = workspace();
    let mut memory = WorkingMemory::open(&config).unwrap();
    memory.bootstrap().await;
    memory.set_max_tokens(300);
    memory.set_strategy(SelectionStrategy::Relevant);

    let tools = default_registry(memory.store());
    call(&tools, "memory_write", json!({"path": "grid/match.md", "content": "borrow checker notes"})).await;
    call(&tools, "memory_write", json!({"path": "grid/noise.md", "content": "x".repeat(1200)})).await;

    let report = memory.select(&["borrow".to_string()]).await;
    let ids: Vec<&str> = report.selected.iter().map(|b| b.id.as_str()).collect();
    assert!(ids.contains(&"personal"));
    assert!(ids.contains(&"grid/match.md"));
    assert!(!ids.contains(&"grid/noise.md"));
    assert!(dir.path().join("grid/noise.md").exists());
}

#[tokio::test]
async fn cancelled_reasoner_is_reported() {
    let (_dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    let response = memory.ask(&ShutdownReasoner, "anything").await.unwrap();
    assert!(response.cancelled);
    assert!(response.output.is_null());
}

#[tokio::test]
async fn reasoner_failure_propagates() {
    let (_dir, config) = workspace();
    let memory = WorkingMemory::open(&config).unwrap();
    let err = memory.ask(&OfflineReasoner, "anything").await.unwrap_err();
    assert!(matches!(err, cybermem_core::Error::Reasoner(ReasonerError::RequestFailed(_))));
}
