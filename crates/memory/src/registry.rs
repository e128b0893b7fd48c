//! Memory registry: the authoritative in-memory index of known blocks.
//!
//! Holds exactly one block per id plus a secondary index by content type
//! and a short access history used for recency boosts. Never holds file
//! content; that lives in the loader cache.

use chrono::{DateTime, Utc};
use cybermem_core::{ContentType, MemoryBlock, MemoryItem, MemoryRecord, Priority};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

/// How many recent accesses are remembered.
const ACCESS_HISTORY_MAX: usize = 64;

#[derive(Debug, Clone)]
struct Access {
    id: String,
    location: String,
}

/// The block index.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    blocks: HashMap<String, MemoryBlock>,
    by_type: HashMap<ContentType, BTreeSet<String>>,
    history: VecDeque<Access>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block, replacing any block with the same id.
    ///
    /// Returns the replaced block, if any.
    pub fn add(&mut self, block: MemoryBlock) -> Option<MemoryBlock> {
        let id = block.id().to_string();
        let location = block.location().to_string();
        let content_type = block.content_type();

        let previous = self.blocks.insert(id.clone(), block);
        if let Some(prev) = &previous {
            self.unindex(prev.content_type(), &id);
        }
        self.by_type.entry(content_type).or_default().insert(id.clone());
        self.record_access(id, location);
        previous
    }

    /// Remove a block. Absent ids are not an error.
    pub fn remove(&mut self, id: &str) -> Option<MemoryBlock> {
        let removed = self.blocks.remove(id)?;
        self.unindex(removed.content_type(), id);
        self.history.retain(|a| a.id != id);
        debug!(id, "Removed memory block");
        Some(removed)
    }

    /// Refresh a block's freshness without touching its content.
    pub fn touch(&mut self, id: &str, cycle: u64) -> bool {
        let Some(block) = self.blocks.get_mut(id) else {
            return false;
        };
        let header = block.header_mut();
        header.cycle_count = cycle;
        header.timestamp = Some(Utc::now());
        let location = block.location().to_string();
        self.record_access(id.to_string(), location);
        true
    }

    pub fn set_priority(&mut self, id: &str, priority: Priority) -> bool {
        match self.blocks.get_mut(id) {
            Some(block) => {
                block.header_mut().priority = priority;
                true
            }
            None => false,
        }
    }

    pub fn set_confidence(&mut self, id: &str, confidence: f32) -> bool {
        match self.blocks.get_mut(id) {
            Some(block) => {
                block.header_mut().confidence = confidence.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&MemoryBlock> {
        self.blocks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blocks.contains_key(id)
    }

    /// Blocks of one content type, in id order.
    pub fn list_by_type(&self, content_type: ContentType) -> Vec<&MemoryBlock> {
        self.by_type
            .get(&content_type)
            .map(|ids| ids.iter().filter_map(|id| self.blocks.get(id)).collect())
            .unwrap_or_default()
    }

    /// Remove every block at `location` or beneath it.
    pub fn remove_location(&mut self, location: &str) -> usize {
        let nested = format!("{location}/");
        let ids: Vec<String> = self
            .blocks
            .values()
            .filter(|b| b.location() == location || b.location().starts_with(&nested))
            .map(|b| b.id().to_string())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryBlock> {
        self.blocks.values()
    }

    /// All blocks, in id order.
    pub fn blocks(&self) -> Vec<&MemoryBlock> {
        let mut all: Vec<&MemoryBlock> = self.blocks.values().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Most recently accessed locations, newest first, without duplicates.
    pub fn recent_locations(&self, limit: usize) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.history
            .iter()
            .rev()
            .filter(|a| seen.insert(a.location.clone()))
            .take(limit)
            .map(|a| a.location.clone())
            .collect()
    }

    /// Remove every non-pinned block whose expiry has passed.
    pub fn cleanup_expired(&mut self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .blocks
            .values()
            .filter(|b| b.is_expired_at(now))
            .map(|b| b.id().to_string())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Cleaned up expired memory blocks");
        }
        expired.len()
    }

    /// One plain record per block, ordered by id.
    pub fn snapshot(&self) -> Vec<MemoryRecord> {
        self.blocks().into_iter().map(MemoryRecord::from).collect()
    }

    /// Replace all state with the given records.
    ///
    /// Records that fail to parse are logged and skipped. Returns the number
    /// of blocks restored.
    pub fn restore(&mut self, records: &[serde_json::Value]) -> usize {
        self.clear();
        let mut restored = 0;
        for (index, raw) in records.iter().enumerate() {
            let block = serde_json::from_value::<MemoryRecord>(raw.clone())
                .map_err(|e| e.to_string())
                .and_then(|record| MemoryBlock::try_from(record).map_err(|e| e.to_string()));
            match block {
                Ok(block) => {
                    self.add(block);
                    restored += 1;
                }
                Err(e) => warn!(index, error = %e, "Skipping unreadable memory record"),
            }
        }
        restored
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.by_type.clear();
        self.history.clear();
    }

    fn unindex(&mut self, content_type: ContentType, id: &str) {
        if let Some(ids) = self.by_type.get_mut(&content_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_type.remove(&content_type);
            }
        }
    }

    fn record_access(&mut self, id: String, location: String) {
        self.history.push_back(Access { id, location });
        while self.history.len() > ACCESS_HISTORY_MAX {
            self.history.pop_front();
        }
    }
}
