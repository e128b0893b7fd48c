//! Transactional store over the `personal/` and `grid/` roots.
//!
//! Every mutation invalidates the loader cache for the paths it touches and,
//! inside a transaction, journals an undo record before the filesystem is
//! touched. Registry blocks for mutated paths are refreshed immediately
//! outside a transaction; inside one, files read or mutated are registered
//! at the outermost commit.

use crate::journal::{Journal, UndoRecord};
use crate::value::{self, StoreValue};
use chrono::{DateTime, Utc};
use cybermem_core::{ContentType, FileReference, MemoryBlock, MemoryItem, StoreError};
use cybermem_memory::{ContentLoader, MemoryRegistry, content_type};
use cybermem_security::{NamespaceRoots, ResolvedPath};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default cap on the span of a ranged read.
pub const DEFAULT_MAX_RANGE_LINES: usize = 500;

/// Limits and locations for a store instance.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_range_lines: usize,
    pub max_file_bytes: u64,
    pub cache_ttl: Duration,
    /// Where `rmdir` parks subtrees until the outermost commit.
    pub holding_dir: PathBuf,
}

impl StoreOptions {
    /// Defaults with the holding area at `<base>/.holding`.
    pub fn under(base: &Path) -> Self {
        Self {
            max_range_lines: DEFAULT_MAX_RANGE_LINES,
            max_file_bytes: cybermem_memory::loader::DEFAULT_MAX_FILE_BYTES,
            cache_ttl: cybermem_memory::loader::DEFAULT_CACHE_TTL,
            holding_dir: base.join(".holding"),
        }
    }
}

/// Proof that the caller meant to delete one exact path.
///
/// Built separately from the path argument so a delete is never the result
/// of a stray string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDelete {
    path: String,
}

impl ConfirmDelete {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// What `get_info` reports about a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// `None` for directories and binary files.
    pub lines: Option<usize>,
    pub content_type: ContentType,
    pub protected: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// One store shared by the facade and the script tool surface.
pub type SharedStore = Arc<Mutex<TransactionalStore>>;

pub struct TransactionalStore {
    roots: NamespaceRoots,
    loader: ContentLoader,
    registry: MemoryRegistry,
    journal: Journal,
    options: StoreOptions,
    cycle: u64,
}

impl TransactionalStore {
    pub fn new(roots: NamespaceRoots, options: StoreOptions) -> Self {
        let loader = ContentLoader::new(roots.clone())
            .with_ttl(options.cache_ttl)
            .with_max_file_bytes(options.max_file_bytes);
        Self {
            roots,
            loader,
            registry: MemoryRegistry::new(),
            journal: Journal::new(),
            options,
            cycle: 0,
        }
    }

    /// Wrap the store for sharing.
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn roots(&self) -> &NamespaceRoots {
        &self.roots
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MemoryRegistry {
        &mut self.registry
    }

    pub fn loader(&self) -> &ContentLoader {
        &self.loader
    }

    /// Registry and loader together, for callers that read one while loading through the other.
    pub fn parts_mut(&mut self) -> (&MemoryRegistry, &mut ContentLoader) {
        (&self.registry, &mut self.loader)
    }

    pub fn loader_mut(&mut self) -> &mut ContentLoader {
        &mut self.loader
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The logical tick stamped on blocks registered from now on.
    pub fn set_cycle(&mut self, cycle: u64) {
        self.cycle = cycle;
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// Whole-file (or directory listing) read through the loader cache.
    pub fn read(&mut self, path: &str) -> Result<String, StoreError> {
        let resolved = self.roots.resolve(path)?;
        let block: MemoryBlock =
            FileReference::new(resolved.relative.clone(), ContentType::Unknown).into();
        let content = self.loader.load(&block)?;
        self.registry.touch(&resolved.relative, self.cycle);
        if resolved.absolute.is_file() {
            self.journal.touch(&resolved.relative);
        }
        Ok(content)
    }

    /// Lines `start..=end` (1-based, inclusive), streamed from disk.
    pub fn read_range(&mut self, path: &str, start: usize, end: usize) -> Result<String, StoreError> {
        let start = start.max(1);
        if end < start {
            return Ok(String::new());
        }
        let requested = end - start + 1;
        if requested > self.options.max_range_lines {
            return Err(StoreError::RangeTooLarge {
                requested,
                max: self.options.max_range_lines,
            });
        }

        let resolved = self.roots.resolve(path)?;
        if resolved.absolute.is_dir() {
            return Err(type_mismatch(&resolved, "file", "directory"));
        }
        let file = fs::File::open(&resolved.absolute)
            .map_err(|e| StoreError::io(&resolved.relative, e))?;

        let mut lines = Vec::with_capacity(requested);
        for line in BufReader::new(file).lines().skip(start - 1).take(requested) {
            lines.push(line.map_err(|e| StoreError::io(&resolved.relative, e))?);
        }
        self.registry.touch(&resolved.relative, self.cycle);
        self.journal.touch(&resolved.relative);
        Ok(lines.join("\n"))
    }

    pub fn get_info(&self, path: &str) -> Result<FileInfo, StoreError> {
        let resolved = self.roots.resolve(path)?;
        let meta = fs::metadata(&resolved.absolute)
            .map_err(|e| StoreError::io(&resolved.relative, e))?;
        let content_type = content_type::detect_file(&resolved.absolute, &resolved.relative);

        let lines = if meta.is_dir() || content_type == ContentType::OctetStream {
            None
        } else {
            let file = fs::File::open(&resolved.absolute)
                .map_err(|e| StoreError::io(&resolved.relative, e))?;
            Some(BufReader::new(file).split(b'\n').count())
        };

        Ok(FileInfo {
            path: resolved.relative,
            is_dir: meta.is_dir(),
            size: meta.len(),
            lines,
            content_type,
            protected: resolved.protected,
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Read a file into an owned value, typed by its content type.
    pub fn load_value(&mut self, path: &str) -> Result<StoreValue, StoreError> {
        let resolved = self.roots.resolve(path)?;
        let meta = fs::metadata(&resolved.absolute)
            .map_err(|e| StoreError::io(&resolved.relative, e))?;
        if meta.is_dir() {
            return Err(type_mismatch(&resolved, "file", "directory"));
        }
        if meta.len() > self.options.max_file_bytes {
            return Err(StoreError::TooLarge {
                path: resolved.relative,
                size: meta.len(),
                max: self.options.max_file_bytes,
            });
        }

        let bytes = fs::read(&resolved.absolute).map_err(|e| StoreError::io(&resolved.relative, e))?;
        let head = &bytes[..bytes.len().min(content_type::SNIFF_BYTES)];
        let content_type = content_type::detect(&resolved.relative, head);
        self.registry.touch(&resolved.relative, self.cycle);
        self.journal.touch(&resolved.relative);
        Ok(value::decode(&resolved.relative, content_type, &bytes))
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Persist a value handed out by [`load_value`](Self::load_value).
    pub fn save(&mut self, path: &str, value: &StoreValue) -> Result<usize, StoreError> {
        self.write(path, value.clone())
    }

    /// Serialize and write, creating missing parent directories.
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, path: &str, value: impl Into<StoreValue>) -> Result<usize, StoreError> {
        let resolved = self.roots.resolve_writable(path)?;
        if resolved.absolute.is_dir() {
            return Err(type_mismatch(&resolved, "file", "directory"));
        }
        let bytes = value::encode(&resolved.relative, &value.into());

        self.ensure_parents(&resolved)?;
        let previous = if resolved.absolute.exists() {
            Some(fs::read(&resolved.absolute).map_err(|e| StoreError::io(&resolved.relative, e))?)
        } else {
            None
        };

        let record = UndoRecord::Write {
            location: resolved.relative.clone(),
            path: resolved.absolute.clone(),
            previous,
        };
        if let Err(e) = self.journaled(record, || fs::write(&resolved.absolute, &bytes)) {
            self.invalidate(&resolved.relative);
            return Err(StoreError::io(&resolved.relative, e));
        }
        debug!(path = %resolved.relative, bytes = bytes.len(), "Wrote file");
        self.mutated(&resolved.relative);
        Ok(bytes.len())
    }

    /// Append text, creating the file if needed.
    pub fn append(&mut self, path: &str, text: &str) -> Result<usize, StoreError> {
        let resolved = self.roots.resolve_writable(path)?;
        if resolved.absolute.is_dir() {
            return Err(type_mismatch(&resolved, "file", "directory"));
        }
        self.ensure_parents(&resolved)?;

        let (existed, previous_len) = match fs::metadata(&resolved.absolute) {
            Ok(meta) => (true, meta.len()),
            Err(_) => (false, 0),
        };

        let record = UndoRecord::Append {
            location: resolved.relative.clone(),
            path: resolved.absolute.clone(),
            existed,
            previous_len,
        };
        let appended = self.journaled(record, || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved.absolute)?
                .write_all(text.as_bytes())
        });
        if let Err(e) = appended {
            self.invalidate(&resolved.relative);
            return Err(StoreError::io(&resolved.relative, e));
        }
        self.mutated(&resolved.relative);
        Ok(text.len())
    }

    /// Create a directory and any missing parents. Existing directories are fine.
    pub fn mkdir(&mut self, path: &str) -> Result<(), StoreError> {
        let resolved = self.roots.resolve_writable(path)?;
        if resolved.absolute.is_dir() {
            return Ok(());
        }
        if resolved.absolute.exists() {
            return Err(StoreError::AlreadyExists {
                path: resolved.relative,
            });
        }
        self.create_dirs(&resolved.absolute)?;
        self.mutated(&resolved.relative);
        Ok(())
    }

    /// Remove a directory tree.
    ///
    /// Inside a transaction the tree is parked in the holding area and only
    /// discarded by the outermost commit.
    pub fn rmdir(&mut self, path: &str) -> Result<(), StoreError> {
        let resolved = self.roots.resolve_writable(path)?;
        if resolved.relative == resolved.namespace.prefix() {
            return Err(StoreError::PermissionDenied {
                path: resolved.relative,
                reason: "namespace roots cannot be removed".into(),
            });
        }
        let meta = fs::metadata(&resolved.absolute)
            .map_err(|e| StoreError::io(&resolved.relative, e))?;
        if !meta.is_dir() {
            return Err(type_mismatch(&resolved, "directory", "file"));
        }

        if self.journal.is_active() {
            let held = self.options.holding_dir.join(uuid::Uuid::new_v4().to_string());
            fs::create_dir_all(&self.options.holding_dir)
                .map_err(|e| StoreError::io(&resolved.relative, e))?;
            fs::rename(&resolved.absolute, &held)
                .map_err(|e| StoreError::io(&resolved.relative, e))?;
            debug!(path = %resolved.relative, held = %held.display(), "Parked directory for commit");
            self.journal.record(UndoRecord::Rmdir {
                location: resolved.relative.clone(),
                path: resolved.absolute.clone(),
                held,
            });
        } else {
            fs::remove_dir_all(&resolved.absolute)
                .map_err(|e| StoreError::io(&resolved.relative, e))?;
        }
        self.mutated(&resolved.relative);
        Ok(())
    }

    /// Rename `from` to `to`. Refuses to overwrite.
    pub fn move_path(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        let source = self.roots.resolve_writable(from)?;
        let target = self.roots.resolve_writable(to)?;
        if !source.absolute.exists() {
            return Err(StoreError::NotFound {
                path: source.relative,
            });
        }
        if target.absolute.exists() {
            return Err(StoreError::AlreadyExists {
                path: target.relative,
            });
        }

        self.ensure_parents(&target)?;
        fs::rename(&source.absolute, &target.absolute)
            .map_err(|e| StoreError::io(&source.relative, e))?;
        self.journal.record(UndoRecord::Move {
            from_location: source.relative.clone(),
            to_location: target.relative.clone(),
            from: source.absolute.clone(),
            to: target.absolute.clone(),
        });
        self.mutated(&source.relative);
        self.mutated(&target.relative);
        Ok(())
    }

    /// Delete a single file.
    pub fn delete(&mut self, confirmation: ConfirmDelete) -> Result<(), StoreError> {
        let resolved = self.roots.resolve_writable(confirmation.path())?;
        let meta = fs::metadata(&resolved.absolute)
            .map_err(|e| StoreError::io(&resolved.relative, e))?;
        if meta.is_dir() {
            return Err(type_mismatch(&resolved, "file", "directory"));
        }

        let previous =
            fs::read(&resolved.absolute).map_err(|e| StoreError::io(&resolved.relative, e))?;
        fs::remove_file(&resolved.absolute).map_err(|e| StoreError::io(&resolved.relative, e))?;
        self.journal.record(UndoRecord::Delete {
            location: resolved.relative.clone(),
            path: resolved.absolute.clone(),
            previous,
        });
        info!(path = %resolved.relative, "Deleted file");
        self.mutated(&resolved.relative);
        Ok(())
    }

    // ── Transactions ──────────────────────────────────────────────────────

    pub fn in_transaction(&self) -> bool {
        self.journal.is_active()
    }

    pub fn transaction_depth(&self) -> usize {
        self.journal.depth()
    }

    /// Open a (possibly nested) transaction. Returns the new depth.
    pub fn begin(&mut self) -> usize {
        let depth = self.journal.begin();
        debug!(depth, "Transaction started");
        depth
    }

    /// Close the innermost transaction; the outermost commit finalizes.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let Some(finalized) = self.journal.commit()? else {
            return Ok(());
        };

        for held in &finalized.held {
            if let Err(e) = fs::remove_dir_all(held) {
                warn!(path = %held.display(), error = %e, "Failed to discard held directory");
            }
        }
        for location in &finalized.touched {
            self.register(location);
        }
        debug!(touched = finalized.touched.len(), "Transaction committed");
        Ok(())
    }

    /// Undo the innermost transaction. Returns the number of records undone.
    pub fn rollback(&mut self) -> Result<usize, StoreError> {
        let unwound = self.journal.rollback()?;
        for location in &unwound.locations {
            self.invalidate(location);
        }
        if unwound.failed > 0 {
            warn!(undone = unwound.undone, failed = unwound.failed, "Rollback finished with failures");
        } else {
            debug!(undone = unwound.undone, "Transaction rolled back");
        }
        Ok(unwound.undone)
    }

    /// Run `f` inside a transaction: commit on success, roll back on error.
    pub fn run_in_transaction<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Self) -> Result<T, StoreError>,
    {
        self.begin();
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(error = %rollback_err, "Rollback after failure did not run");
                }
                Err(e)
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn mutated(&mut self, location: &str) {
        self.invalidate(location);
        if self.journal.is_active() {
            self.journal.touch(location);
        } else {
            self.register(location);
        }
    }

    /// Journal `record`, then run the mutation it reverses.
    ///
    /// The record stays even when `mutation` fails: a write can truncate
    /// before it errors, and rollback must still restore the old bytes.
    fn journaled<T>(
        &mut self,
        record: UndoRecord,
        mutation: impl FnOnce() -> io::Result<T>,
    ) -> io::Result<T> {
        self.journal.record(record);
        mutation()
    }

    fn invalidate(&mut self, location: &str) {
        self.loader.invalidate(location);
        if let Some((parent, _)) = location.rsplit_once('/') {
            self.loader.invalidate_entry(parent);
        }
    }

    /// Refresh the block for `location`, or drop blocks whose file vanished.
    ///
    /// A refreshed block keeps the priority, pin, confidence, expiry and
    /// metadata of the block it replaces.
    fn register(&mut self, location: &str) {
        let Ok(resolved) = self.roots.resolve(location) else {
            return;
        };
        if !resolved.absolute.exists() {
            let removed = self.registry.remove_location(&resolved.relative);
            if removed > 0 {
                debug!(path = %resolved.relative, removed, "Dropped blocks for vanished path");
            }
            return;
        }

        let content_type = content_type::detect_file(&resolved.absolute, &resolved.relative);
        let mut block: MemoryBlock = FileReference::new(resolved.relative.clone(), content_type).into();
        if let Some(existing) = self.registry.get(&resolved.relative) {
            let old = existing.header().clone();
            let header = block.header_mut();
            header.priority = old.priority;
            header.pinned = old.pinned;
            header.confidence = old.confidence;
            header.expiry = old.expiry;
            header.metadata = old.metadata;
        }
        self.registry.add(block.at_cycle(self.cycle));
    }

    /// Create every missing ancestor of `resolved`, journaling each one.
    fn ensure_parents(&mut self, resolved: &ResolvedPath) -> Result<(), StoreError> {
        match resolved.absolute.parent() {
            Some(parent) if !parent.is_dir() => self.create_dirs(parent),
            _ => Ok(()),
        }
    }

    fn create_dirs(&mut self, target: &Path) -> Result<(), StoreError> {
        let mut missing = Vec::new();
        let mut cursor = Some(target);
        while let Some(dir) = cursor {
            if dir.exists() {
                break;
            }
            missing.push(dir.to_path_buf());
            cursor = dir.parent();
        }

        for dir in missing.into_iter().rev() {
            let location = self
                .roots
                .relative_of(&dir)
                .unwrap_or_else(|| dir.display().to_string());
            fs::create_dir(&dir).map_err(|e| StoreError::io(&location, e))?;
            self.invalidate(&location);
            self.journal.record(UndoRecord::Mkdir {
                location,
                path: dir,
            });
        }
        Ok(())
    }
}

fn type_mismatch(resolved: &ResolvedPath, expected: &str, found: &str) -> StoreError {
    StoreError::TypeMismatch {
        path: resolved.relative.clone(),
        expected: expected.into(),
        found: found.into(),
    }
}
