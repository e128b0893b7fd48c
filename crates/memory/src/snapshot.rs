//! Snapshot file: the registry checkpoint written between runs.
//!
//! Layout: `{max_tokens, current_task_id, active_topics, memories: [...]}`.
//! Memories are kept as raw JSON values so one unreadable record never costs
//! the rest of the checkpoint.

use cybermem_core::{MemoryError, MemoryRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub max_tokens: usize,
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub active_topics: Vec<String>,
    #[serde(default)]
    pub memories: Vec<serde_json::Value>,
}

impl SnapshotFile {
    /// Build a snapshot from registry records.
    pub fn from_records(
        max_tokens: usize,
        current_task_id: Option<String>,
        active_topics: Vec<String>,
        records: &[MemoryRecord],
    ) -> Result<Self, MemoryError> {
        let memories = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MemoryError::Snapshot(format!("Failed to serialize record: {e}")))?;
        Ok(Self {
            max_tokens,
            current_task_id,
            active_topics,
            memories,
        })
    }

    /// Write atomically: a sibling temp file is written, then renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<(), MemoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Snapshot(format!("Failed to create snapshot directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MemoryError::Snapshot(format!("Failed to serialize snapshot: {e}")))?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = Path::new(&tmp_name);

        std::fs::write(tmp, content)
            .map_err(|e| MemoryError::Snapshot(format!("Failed to write snapshot: {e}")))?;
        std::fs::rename(tmp, path)
            .map_err(|e| MemoryError::Snapshot(format!("Failed to replace snapshot: {e}")))?;

        debug!(path = %path.display(), memories = self.memories.len(), "Snapshot written");
        Ok(())
    }

    /// Read a snapshot. Absent or unreadable files yield `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot found, starting fresh");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read snapshot, starting fresh");
                return None;
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupted snapshot, starting fresh");
                None
            }
        }
    }
}
