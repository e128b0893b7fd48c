//! Context assembly pipeline.
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Filter | [`tag_filter`] | visible blocks |
//! | Score | [`scorer`] | 0..1 relevance per block |
//! | Select | [`selector`] | blocks within the token budget |
//! | Build | [`builder`] | the reasoner payload |
//!
//! [`WorkingMemory`] runs the stages in order over the shared store.

pub mod builder;
pub mod scorer;
pub mod selector;
pub mod tag_filter;
pub mod token;
pub mod working_memory;

pub use builder::{ContextBuilder, ContextEntry, ContextPayload};
pub use scorer::{RelevanceScorer, keywords_from};
pub use selector::{Candidate, MemorySelector, Selection, SelectionStrategy};
pub use tag_filter::{OVERRIDE_TAGS, TagFilter};
pub use working_memory::{IDENTITY_FILE, SelectedBlock, SelectionReport, WorkingMemory};
