//! Working memory: the facade the control loop talks to.
//!
//! Owns the shared store handle plus the selection state around it (budget,
//! strategy, tag filter, current task, active topics, cycle) and runs the
//! pipeline:
//!
//! ```text
//! registry ─► tag filter ─► scorer ─► selector ─► builder ─► reasoner request
//! ```
//!
//! The same store handle is given to the script tool surface, so every
//! operation here takes the store lock for its whole duration.

use crate::context::builder::{ContextBuilder, ContextPayload};
use crate::context::scorer::{RelevanceScorer, keywords_from};
use crate::context::selector::{Candidate, MemorySelector, Selection, SelectionStrategy};
use crate::context::tag_filter::TagFilter;
use crate::context::token;
use cybermem_config::AppConfig;
use cybermem_core::{
    ContentType, Error, FileReference, MemoryBlock, MemoryError, MemoryItem, Priority, Reasoner,
    ReasonerRequest, ReasonerResponse,
};
use cybermem_memory::{ContentLoader, MemoryRegistry, SnapshotFile, content_type};
use cybermem_security::NamespaceRoots;
use cybermem_store::{SharedStore, StoreOptions, TransactionalStore};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many recent locations feed the context score.
const RECENT_LOCATION_WINDOW: usize = 10;

/// Identity file looked up under `personal/<marker>/` at bootstrap.
pub const IDENTITY_FILE: &str = "identity.json";

/// A selected block with the numbers that got it selected.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedBlock {
    pub id: String,
    pub priority: Priority,
    pub pinned: bool,
    pub tokens: usize,
    pub score: f32,
}

/// Summary of one selection pass.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub strategy: String,
    pub max_tokens: usize,
    pub candidates: usize,
    pub filtered_out: usize,
    pub selected: Vec<SelectedBlock>,
    pub total_tokens: usize,
    pub pinned_overflow: bool,
}

/// One filter/score/select pass with its tallies.
struct SelectionPass<'a> {
    selection: Selection<'a>,
    candidates: usize,
    filtered_out: usize,
}

pub struct WorkingMemory {
    store: SharedStore,
    snapshot_path: PathBuf,
    max_tokens: usize,
    strategy: SelectionStrategy,
    filter: TagFilter,
    current_task_id: Option<String>,
    active_topics: Vec<String>,
    cycle: u64,
}

impl WorkingMemory {
    /// Open over the configured roots. Missing roots are fatal.
    pub fn open(config: &AppConfig) -> Result<Self, Error> {
        let roots = NamespaceRoots::new(config.personal_dir(), config.grid_dir())
            .with_protected_marker(config.store.protected_marker.clone());
        if let Some(missing) = roots.missing_roots().first() {
            return Err(MemoryError::MissingRoot(missing.display().to_string()).into());
        }

        let options = StoreOptions {
            max_range_lines: config.store.max_range_lines,
            max_file_bytes: config.memory.max_file_bytes,
            cache_ttl: Duration::from_secs(config.memory.cache_ttl_secs),
            holding_dir: config.holding_dir(),
        };
        let strategy = config
            .memory
            .strategy
            .parse()
            .map_err(|message| Error::Config { message })?;

        info!(
            base_dir = %config.base_dir().display(),
            max_tokens = config.memory.max_tokens,
            strategy = %strategy,
            "Working memory opened"
        );
        Ok(Self::with_store(
            TransactionalStore::new(roots, options).shared(),
            config.snapshot_path(),
            config.memory.max_tokens,
        )
        .with_strategy(strategy)
        .with_filter(TagFilter::new(&config.filter.tag_blacklist)))
    }

    /// Wrap an existing store handle.
    pub fn with_store(store: SharedStore, snapshot_path: PathBuf, max_tokens: usize) -> Self {
        Self {
            store,
            snapshot_path,
            max_tokens,
            strategy: SelectionStrategy::default(),
            filter: TagFilter::default(),
            current_task_id: None,
            active_topics: Vec::new(),
            cycle: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = filter;
        self
    }

    /// A clone of the store handle, for the script tool surface.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn set_max_tokens(&mut self, max_tokens: usize) {
        self.max_tokens = max_tokens;
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: SelectionStrategy) {
        self.strategy = strategy;
    }

    pub fn current_task_id(&self) -> Option<&str> {
        self.current_task_id.as_deref()
    }

    pub fn set_task(&mut self, task_id: Option<String>) {
        self.current_task_id = task_id;
    }

    pub fn active_topics(&self) -> &[String] {
        &self.active_topics
    }

    pub fn set_active_topics(&mut self, topics: Vec<String>) {
        self.active_topics = topics;
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advance the logical clock; blocks registered afterwards carry the new tick.
    pub async fn advance_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.store.lock().await.set_cycle(self.cycle);
        self.cycle
    }

    /// Register the always-present blocks: both namespace roots and, when
    /// present, the identity file. All are pinned.
    pub async fn bootstrap(&self) -> usize {
        let mut store = self.store.lock().await;
        let marker = store.roots().protected_marker().to_string();
        let identity = format!("personal/{marker}/{IDENTITY_FILE}");

        let mut blocks: Vec<MemoryBlock> = ["personal", "grid"]
            .into_iter()
            .map(|root| {
                MemoryBlock::from(FileReference::new(root, ContentType::Unknown))
                    .with_priority(Priority::System)
                    .with_metadata("description", serde_json::json!("namespace root"))
            })
            .collect();

        if let Ok(resolved) = store.roots().resolve(&identity)
            && resolved.absolute.is_file()
        {
            let ty = content_type::detect_file(&resolved.absolute, &resolved.relative);
            blocks.push(
                MemoryBlock::from(FileReference::new(resolved.relative, ty))
                    .with_priority(Priority::Foundational)
                    .with_metadata("description", serde_json::json!("agent identity")),
            );
        }

        let count = blocks.len();
        let registry = store.registry_mut();
        for block in blocks {
            registry.add(block.pin().at_cycle(self.cycle));
        }
        debug!(count, "Bootstrap blocks registered");
        count
    }

    /// Filter, score and select, without loading anything into a payload.
    pub async fn select(&self, task_keywords: &[String]) -> SelectionReport {
        let mut guard = self.store.lock().await;
        let (registry, loader) = guard.parts_mut();
        let pass = self.run_selection(registry, loader, task_keywords);

        SelectionReport {
            strategy: self.strategy.to_string(),
            max_tokens: self.max_tokens,
            candidates: pass.candidates,
            filtered_out: pass.filtered_out,
            selected: pass
                .selection
                .selected
                .iter()
                .map(|c| SelectedBlock {
                    id: c.block.id().to_string(),
                    priority: c.block.priority(),
                    pinned: c.block.pinned(),
                    tokens: c.tokens,
                    score: c.score,
                })
                .collect(),
            total_tokens: pass.selection.total_tokens(),
            pinned_overflow: pass.selection.pinned_overflow,
        }
    }

    /// The full pipeline: filter, score, select, load and render.
    pub async fn build_context(&self, task_keywords: &[String]) -> ContextPayload {
        let mut guard = self.store.lock().await;
        let (registry, loader) = guard.parts_mut();
        let pass = self.run_selection(registry, loader, task_keywords);
        ContextBuilder::new().build(&pass.selection.blocks(), loader)
    }

    /// Build the request for one reasoning step.
    pub async fn prepare_request(&self, prompt: &str) -> ReasonerRequest {
        let mut keywords = keywords_from(prompt);
        for topic in &self.active_topics {
            let topic = topic.to_lowercase();
            if !keywords.contains(&topic) {
                keywords.push(topic);
            }
        }
        let payload = self.build_context(&keywords).await;
        ReasonerRequest {
            task_id: self.current_task_id.clone(),
            prompt: prompt.to_string(),
            context: payload.to_json(),
            max_tokens: self.max_tokens,
            cycle: self.cycle,
        }
    }

    /// Send one reasoning step and wait for the answer.
    pub async fn ask(&self, reasoner: &dyn Reasoner, prompt: &str) -> Result<ReasonerResponse, Error> {
        let request = self.prepare_request(prompt).await;
        debug!(reasoner = reasoner.name(), cycle = self.cycle, "Sending reasoner request");
        let response = reasoner.reason(request).await?;
        if response.cancelled {
            info!(reasoner = reasoner.name(), "Reasoner wait cancelled");
        }
        Ok(response)
    }

    /// Remove expired, unpinned blocks.
    pub async fn cleanup(&self) -> usize {
        self.store.lock().await.registry_mut().cleanup_expired()
    }

    /// Write the registry and selection state to the snapshot file.
    pub async fn checkpoint(&self) -> Result<(), MemoryError> {
        let records = self.store.lock().await.registry().snapshot();
        SnapshotFile::from_records(
            self.max_tokens,
            self.current_task_id.clone(),
            self.active_topics.clone(),
            &records,
        )?
        .save(&self.snapshot_path)?;
        info!(path = %self.snapshot_path.display(), blocks = records.len(), "Working memory checkpointed");
        Ok(())
    }

    /// Reload state from the snapshot file. A missing or corrupt snapshot
    /// leaves a fresh registry. Returns the number of blocks restored.
    pub async fn restore(&mut self) -> usize {
        let Some(snapshot) = SnapshotFile::load(&self.snapshot_path) else {
            return 0;
        };
        if snapshot.max_tokens > 0 {
            self.max_tokens = snapshot.max_tokens;
        } else {
            warn!("Snapshot carries a zero token budget, keeping the configured one");
        }
        self.current_task_id = snapshot.current_task_id;
        self.active_topics = snapshot.active_topics;

        let restored = self.store.lock().await.registry_mut().restore(&snapshot.memories);
        info!(restored, "Working memory restored from snapshot");
        restored
    }

    fn scorer(&self, task_keywords: &[String], recent: Vec<String>) -> RelevanceScorer {
        RelevanceScorer::new(task_keywords, &recent).with_active_topics(&self.active_topics)
    }

    /// Tag filter, score, estimate tokens and select over the registry.
    ///
    /// Token estimates come from loaded content; a block that fails to load
    /// is costed by its error text, which is what the builder renders.
    fn run_selection<'a>(
        &self,
        registry: &'a MemoryRegistry,
        loader: &mut ContentLoader,
        task_keywords: &[String],
    ) -> SelectionPass<'a> {
        let all = registry.blocks();
        let visible = self.filter.apply(all.iter().copied());
        let scorer = self.scorer(task_keywords, registry.recent_locations(RECENT_LOCATION_WINDOW));

        let candidates: Vec<Candidate<'a>> = visible
            .iter()
            .map(|&block| {
                let tokens = match loader.load(block) {
                    Ok(content) => token::estimate_block_tokens(&content),
                    Err(e) => token::estimate_block_tokens(&e.to_string()),
                };
                Candidate::new(block, tokens, scorer.score(block))
            })
            .collect();

        SelectionPass {
            candidates: visible.len(),
            filtered_out: all.len() - visible.len(),
            selection: MemorySelector::new(self.strategy).select(candidates, self.max_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cybermem_core::ReasonerError;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.store.base_dir = Some(dir.path().to_path_buf());
        config
    }

    fn setup() -> (TempDir, WorkingMemory) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("personal/.internal")).unwrap();
        std::fs::create_dir_all(dir.path().join("grid")).unwrap();
        let wm = WorkingMemory::open(&config(&dir)).unwrap();
        (dir, wm)
    }

    struct ContextEcho;

    #[async_trait]
    impl Reasoner for ContextEcho {
        fn name(&self) -> &str {
            "context-echo"
        }

        async fn reason(&self, request: ReasonerRequest) -> Result<ReasonerResponse, ReasonerError> {
            Ok(ReasonerResponse::new(serde_json::json!({
                "blocks": request.context.as_array().map(|a| a.len()).unwrap_or(0),
                "task": request.task_id,
            })))
        }
    }

    #[test]
    fn missing_roots_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkingMemory::open(&config(&dir)).err().unwrap();
        assert!(matches!(err, Error::Memory(MemoryError::MissingRoot(_))));
    }

    #[tokio::test]
    async fn bootstrap_pins_roots_and_identity() {
        let (dir, wm) = setup();
        std::fs::write(dir.path().join("personal/.internal/identity.json"), r#"{"name":"cy"}"#).unwrap();
        assert_eq!(wm.bootstrap().await, 3);

        let store = wm.store();
        let store = store.lock().await;
        let identity = store.registry().get("personal/.internal/identity.json").unwrap();
        assert!(identity.pinned());
        assert_eq!(identity.priority(), Priority::Foundational);
        assert!(store.registry().get("grid").unwrap().pinned());
    }

    #[tokio::test]
    async fn writes_flow_into_context() {
        let (_dir, wm) = setup();
        {
            let store = wm.store();
            let mut store = store.lock().await;
            store.write("personal/notes/rust.md", "ownership and borrowing").unwrap();
            store.write("grid/board/chatter.md", "unrelated").unwrap();
        }

        let payload = wm.build_context(&["ownership".to_string()]).await;
        assert_eq!(payload.len(), 2);
        let rendered = payload.render();
        assert!(rendered.contains("ownership and borrowing"));
        assert!(payload.total_tokens > 0);
    }

    #[tokio::test]
    async fn report_and_payload_pick_the_same_blocks() {
        let (_dir, mut wm) = setup();
        {
            let store = wm.store();
            let mut store = store.lock().await;
            store.write("personal/notes/a.md", "parser notes").unwrap();
            store.write("grid/board/b.md", "parser thread").unwrap();
            store.write("grid/big.md", "x".repeat(2000)).unwrap();
        }
        wm.set_max_tokens(300);

        let keywords = ["parser".to_string()];
        let report = wm.select(&keywords).await;
        let payload = wm.build_context(&keywords).await;

        let mut reported: Vec<&str> = report.selected.iter().map(|b| b.id.as_str()).collect();
        let mut built: Vec<&str> = payload.entries.iter().map(|e| e.id.as_str()).collect();
        reported.sort_unstable();
        built.sort_unstable();
        assert_eq!(report.candidates, 3);
        assert!(!reported.contains(&"grid/big.md"));
        assert_eq!(reported, built);
    }

    #[tokio::test]
    async fn tag_filter_hides_blacklisted_knowledge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("personal")).unwrap();
        std::fs::create_dir_all(dir.path().join("grid/knowledge")).unwrap();
        let mut cfg = config(&dir);
        cfg.filter.tag_blacklist = vec!["gossip".into()];
        let wm = WorkingMemory::open(&cfg).unwrap();

        {
            let store = wm.store();
            let mut store = store.lock().await;
            store.write("grid/knowledge/a.yaml", serde_json::json!({"title": "a"})).unwrap();
            store.write("grid/knowledge/b.yaml", serde_json::json!({"title": "b"})).unwrap();
            let registry = store.registry_mut();
            let tagged = registry
                .get("grid/knowledge/b.yaml")
                .unwrap()
                .clone()
                .with_metadata("tags", serde_json::json!(["gossip"]));
            registry.add(tagged);
        }

        let report = wm.select(&[]).await;
        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.selected.len(), 1);
        assert_eq!(report.selected[0].id, "grid/knowledge/a.yaml");
    }

    #[tokio::test]
    async fn checkpoint_and_restore() {
        let (dir, mut wm) = setup();
        wm.set_task(Some("task-42".into()));
        wm.set_active_topics(vec!["parsing".into()]);
        wm.set_max_tokens(1234);
        wm.store().lock().await.write("personal/plan.md", "step 1").unwrap();
        wm.checkpoint().await.unwrap();
        assert!(dir.path().join("personal/.internal/memory_snapshot.json").exists());

        let mut fresh = WorkingMemory::open(&config(&dir)).unwrap();
        assert_eq!(fresh.restore().await, 1);
        assert_eq!(fresh.max_tokens(), 1234);
        assert_eq!(fresh.current_task_id(), Some("task-42"));
        assert_eq!(fresh.active_topics(), ["parsing".to_string()]);
        assert!(fresh.store().lock().await.registry().contains("personal/plan.md"));
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_fresh() {
        let (dir, mut wm) = setup();
        std::fs::write(dir.path().join("personal/.internal/memory_snapshot.json"), "garbage").unwrap();
        assert_eq!(wm.restore().await, 0);
        assert_eq!(wm.max_tokens(), 8000);
    }

    #[tokio::test]
    async fn cleanup_removes_expired() {
        let (_dir, wm) = setup();
        {
            let store = wm.store();
            let mut store = store.lock().await;
            store.registry_mut().add(
                MemoryBlock::from(FileReference::new("grid/stale", ContentType::TextPlain))
                    .with_expiry(chrono::Utc::now() - chrono::Duration::seconds(1)),
            );
        }
        assert_eq!(wm.cleanup().await, 1);
    }

    #[tokio::test]
    async fn ask_sends_context_and_task() {
        let (_dir, mut wm) = setup();
        wm.bootstrap().await;
        wm.set_task(Some("t-1".into()));
        assert_eq!(wm.advance_cycle().await, 1);

        let response = wm.ask(&ContextEcho, "what next?").await.unwrap();
        assert_eq!(response.output["blocks"], 2);
        assert_eq!(response.output["task"], "t-1");

        let request = wm.prepare_request("what next?").await;
        assert_eq!(request.cycle, 1);
        assert_eq!(request.max_tokens, 8000);
    }

    #[tokio::test]
    async fn cycle_stamps_registered_blocks() {
        let (_dir, mut wm) = setup();
        wm.advance_cycle().await;
        wm.advance_cycle().await;
        let store = wm.store();
        let mut store = store.lock().await;
        store.write("grid/tick.txt", "t").unwrap();
        assert_eq!(store.registry().get("grid/tick.txt").unwrap().cycle_count(), 2);
    }
}
