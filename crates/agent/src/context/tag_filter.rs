//! Tag filter: hides blacklisted knowledge before selection.
//!
//! Only knowledge-typed blocks are ever filtered, and a block carrying one of
//! the override tags stays visible whatever else it is tagged with.

use cybermem_core::{ContentType, MemoryBlock, MemoryItem};
use std::collections::BTreeSet;
use tracing::debug;

/// Tags that keep a knowledge block visible regardless of the blacklist.
pub const OVERRIDE_TAGS: [&str; 4] = ["critical", "urgent", "system", "error"];

#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    blacklist: BTreeSet<String>,
}

impl TagFilter {
    pub fn new<I, S>(blacklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blacklist: blacklist
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty()
    }

    pub fn allows(&self, block: &MemoryBlock) -> bool {
        if self.blacklist.is_empty() || block.content_type() != ContentType::Knowledge {
            return true;
        }
        let tags: Vec<String> = block.tags().iter().map(|t| t.to_lowercase()).collect();
        if tags.iter().any(|t| OVERRIDE_TAGS.contains(&t.as_str())) {
            return true;
        }
        !tags.iter().any(|t| self.blacklist.contains(t))
    }

    /// The blocks that pass, in input order.
    pub fn apply<'a, I>(&self, blocks: I) -> Vec<&'a MemoryBlock>
    where
        I: IntoIterator<Item = &'a MemoryBlock>,
    {
        let (kept, hidden): (Vec<_>, Vec<_>) = blocks.into_iter().partition(|b| self.allows(b));
        if !hidden.is_empty() {
            debug!(hidden = hidden.len(), "Tag filter hid knowledge blocks");
        }
        kept
    }
}
