//! Transactional, file-backed store for cybermem.
//!
//! Reads go through the content loader cache; writes, appends, moves,
//! directory changes and deletes are journaled inside a transaction and can
//! be rolled back. See [`TransactionalStore`].

pub mod journal;
pub mod store;
pub mod value;

pub use journal::UndoRecord;
pub use store::{ConfirmDelete, FileInfo, SharedStore, StoreOptions, TransactionalStore};
pub use value::StoreValue;
