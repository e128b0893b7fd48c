//! # cybermem core
//!
//! Domain types, traits, and error definitions for the Cyber working-memory
//! subsystem. This crate has **no I/O**: it defines the block model and the
//! seams (reasoner, tools) that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator outside the core is a trait here:
//! - the reasoner is reached through [`Reasoner`]
//! - the script environment only sees [`Tool`]s registered in a [`ToolRegistry`]
//!
//! Blocks are a closed enum ([`MemoryBlock`]) with shared accessors on
//! [`MemoryItem`], never an open class hierarchy.

pub mod block;
pub mod error;
pub mod reasoner;
pub mod record;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use block::{
    BlockHeader, ContentType, FileReference, MemoryBlock, MemoryItem, Metadata, Observation,
    Priority, content_digest, short_digest,
};
pub use error::{Error, MemoryError, ReasonerError, Result, StoreError, ToolError};
pub use reasoner::{Reasoner, ReasonerRequest, ReasonerResponse};
pub use record::MemoryRecord;
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult};
