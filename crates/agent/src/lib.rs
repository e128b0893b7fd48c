//! The working-memory pipeline of cybermem.
//!
//! Each reasoning step follows the same path:
//!
//! 1. **Filter** blacklisted knowledge out of the registry
//! 2. **Score** every visible block against the task keywords
//! 3. **Select** blocks under the token budget with the configured strategy
//! 4. **Build** the payload and hand it to the [`Reasoner`](cybermem_core::Reasoner)
//!
//! [`WorkingMemory`] owns the state between steps and checkpoints it to disk.

pub mod context;

pub use context::{
    Candidate, ContextBuilder, ContextEntry, ContextPayload, MemorySelector, RelevanceScorer,
    SelectedBlock, Selection, SelectionReport, SelectionStrategy, TagFilter, WorkingMemory,
    keywords_from,
};
