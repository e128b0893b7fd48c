//! Undo journal for store transactions.
//!
//! Each mutation inside an open transaction pushes one [`UndoRecord`].
//! Nested transactions push a checkpoint; rollback unwinds the records above
//! the innermost checkpoint in reverse order.

use cybermem_core::StoreError;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How to reverse one mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    Write {
        location: String,
        path: PathBuf,
        /// `None` when the file did not exist.
        previous: Option<Vec<u8>>,
    },
    Append {
        location: String,
        path: PathBuf,
        existed: bool,
        previous_len: u64,
    },
    Mkdir {
        location: String,
        path: PathBuf,
    },
    Rmdir {
        location: String,
        path: PathBuf,
        /// Where the subtree waits until the outermost commit.
        held: PathBuf,
    },
    Move {
        from_location: String,
        to_location: String,
        from: PathBuf,
        to: PathBuf,
    },
    Delete {
        location: String,
        path: PathBuf,
        previous: Vec<u8>,
    },
}

impl UndoRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Append { .. } => "append",
            Self::Mkdir { .. } => "mkdir",
            Self::Rmdir { .. } => "rmdir",
            Self::Move { .. } => "move",
            Self::Delete { .. } => "delete",
        }
    }

    /// Store paths whose state this record restores.
    pub fn locations(&self) -> Vec<&str> {
        match self {
            Self::Write { location, .. }
            | Self::Append { location, .. }
            | Self::Mkdir { location, .. }
            | Self::Rmdir { location, .. }
            | Self::Delete { location, .. } => vec![location.as_str()],
            Self::Move {
                from_location,
                to_location,
                ..
            } => vec![from_location.as_str(), to_location.as_str()],
        }
    }

    /// Put the filesystem back the way it was before the mutation.
    pub fn undo(&self) -> io::Result<()> {
        match self {
            Self::Write {
                path,
                previous: Some(bytes),
                ..
            }
            | Self::Delete {
                path,
                previous: bytes,
                ..
            } => {
                ensure_parent(path)?;
                fs::write(path, bytes)
            }
            Self::Write {
                path,
                previous: None,
                ..
            }
            | Self::Append {
                path,
                existed: false,
                ..
            } => remove_if_present(path),
            Self::Append {
                path,
                previous_len,
                ..
            } => OpenOptions::new().write(true).open(path)?.set_len(*previous_len),
            Self::Mkdir { path, .. } => match fs::remove_dir(path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
            Self::Rmdir { path, held, .. } => {
                ensure_parent(path)?;
                fs::rename(held, path)
            }
            Self::Move { from, to, .. } => {
                ensure_parent(from)?;
                fs::rename(to, from)
            }
        }
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// What the outermost commit hands back for finalization.
#[derive(Debug, Default)]
pub struct Finalized {
    /// Holding areas that can now be discarded.
    pub held: Vec<PathBuf>,
    /// Store paths mutated during the transaction.
    pub touched: BTreeSet<String>,
}

/// Result of unwinding one transaction level.
#[derive(Debug, Default)]
pub struct Unwound {
    pub undone: usize,
    pub failed: usize,
    pub locations: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Journal {
    records: Vec<UndoRecord>,
    checkpoints: Vec<usize>,
    touched: BTreeSet<String>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_active(&self) -> bool {
        !self.checkpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Open a transaction level. Returns the new depth.
    pub fn begin(&mut self) -> usize {
        self.checkpoints.push(self.records.len());
        self.depth()
    }

    /// Log an undo record. Ignored outside a transaction.
    pub fn record(&mut self, record: UndoRecord) {
        if self.is_active() {
            debug!(kind = record.kind(), depth = self.depth(), "Journaled mutation");
            self.records.push(record);
        }
    }

    /// Remember a store path for registration at the outermost commit.
    pub fn touch(&mut self, location: impl Into<String>) {
        if self.is_active() {
            self.touched.insert(location.into());
        }
    }

    /// Close one level. Only the outermost level yields [`Finalized`].
    pub fn commit(&mut self) -> Result<Option<Finalized>, StoreError> {
        self.checkpoints.pop().ok_or(StoreError::NoActiveTransaction)?;
        if self.is_active() {
            return Ok(None);
        }

        let held = self
            .records
            .drain(..)
            .filter_map(|r| match r {
                UndoRecord::Rmdir { held, .. } => Some(held),
                _ => None,
            })
            .collect();
        Ok(Some(Finalized {
            held,
            touched: std::mem::take(&mut self.touched),
        }))
    }

    /// Undo every record above the innermost checkpoint, newest first.
    ///
    /// A record that fails to undo is logged and skipped; the unwind continues.
    pub fn rollback(&mut self) -> Result<Unwound, StoreError> {
        let checkpoint = self.checkpoints.pop().ok_or(StoreError::NoActiveTransaction)?;
        let mut unwound = Unwound::default();

        while self.records.len() > checkpoint {
            let Some(record) = self.records.pop() else {
                break;
            };
            unwound
                .locations
                .extend(record.locations().into_iter().map(str::to_string));
            match record.undo() {
                Ok(()) => unwound.undone += 1,
                Err(e) => {
                    unwound.failed += 1;
                    warn!(kind = record.kind(), locations = ?record.locations(), error = %e, "Undo failed, continuing rollback");
                }
            }
        }

        if !self.is_active() {
            self.touched.clear();
        }
        Ok(unwound)
    }
}
