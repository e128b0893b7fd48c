//! Working-memory state for cybermem.
//!
//! - [`MemoryRegistry`]: the authoritative index of blocks
//! - [`ContentLoader`]: resolves blocks to text through a TTL cache
//! - [`content_type`]: path and byte-level content-type detection
//! - [`SnapshotFile`]: the on-disk checkpoint of a registry

pub mod content_type;
pub mod loader;
pub mod registry;
pub mod snapshot;

pub use loader::{CacheStats, ContentLoader};
pub use registry::MemoryRegistry;
pub use snapshot::SnapshotFile;
