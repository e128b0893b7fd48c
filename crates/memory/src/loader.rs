//! Content loader: resolves a block to its text, with a TTL cache.
//!
//! The cache is disposable: it is keyed by `(location, digest)` and any entry
//! may be dropped at any time without changing what `load` returns, only how
//! fast it returns it.

use crate::content_type;
use cybermem_core::{ContentType, MemoryBlock, Observation, StoreError};
use cybermem_security::NamespaceRoots;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached content.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default ceiling for a whole-file load.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024;

const NO_DIGEST: &str = "none";

#[derive(Debug, Clone)]
struct CachedContent {
    content: String,
    loaded_at: Instant,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Loads block content from the namespace roots.
#[derive(Debug)]
pub struct ContentLoader {
    roots: NamespaceRoots,
    ttl: Duration,
    max_file_bytes: u64,
    cache: HashMap<(String, String), CachedContent>,
    hits: u64,
    misses: u64,
}

impl ContentLoader {
    pub fn new(roots: NamespaceRoots) -> Self {
        Self {
            roots,
            ttl: DEFAULT_CACHE_TTL,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn roots(&self) -> &NamespaceRoots {
        &self.roots
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Resolve a block to text.
    ///
    /// File references honour their line range after the cache lookup, so a
    /// ranged and an unranged view of the same file share one entry.
    pub fn load(&mut self, block: &MemoryBlock) -> Result<String, StoreError> {
        let file = match block {
            MemoryBlock::Observation(obs) => return Ok(describe_observation(obs)),
            MemoryBlock::File(file) => file,
        };

        let key = (
            file.location.clone(),
            file.digest.clone().unwrap_or_else(|| NO_DIGEST.to_string()),
        );

        let full = match self.cached(&key, file.no_cache) {
            Some(content) => content,
            None => {
                let content = self.read_location(&file.location)?;
                if !file.no_cache {
                    self.cache.insert(
                        key,
                        CachedContent {
                            content: content.clone(),
                            loaded_at: Instant::now(),
                        },
                    );
                }
                content
            }
        };

        Ok(match (file.start_line, file.end_line) {
            (None, None) => full,
            (start, end) => slice_lines(&full, start.unwrap_or(1), end),
        })
    }

    /// Drop every entry for `location` and anything beneath it, whatever the digest.
    pub fn invalidate(&mut self, location: &str) -> usize {
        let location = location.trim_matches('/');
        let nested = format!("{location}/");
        let before = self.cache.len();
        self.cache
            .retain(|(loc, _), _| loc != location && !loc.starts_with(&nested));
        let dropped = before - self.cache.len();
        if dropped > 0 {
            debug!(location, dropped, "Invalidated cached content");
        }
        dropped
    }

    /// Drop entries for exactly `location`, leaving nested paths cached.
    pub fn invalidate_entry(&mut self, location: &str) -> usize {
        let location = location.trim_matches('/');
        let before = self.cache.len();
        self.cache.retain(|(loc, _), _| loc != location);
        before - self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
        }
    }

    fn cached(&mut self, key: &(String, String), bypass: bool) -> Option<String> {
        if bypass {
            self.misses += 1;
            return None;
        }
        match self.cache.get(key) {
            Some(entry) if entry.loaded_at.elapsed() < self.ttl => {
                self.hits += 1;
                Some(entry.content.clone())
            }
            Some(_) => {
                self.cache.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn read_location(&self, location: &str) -> Result<String, StoreError> {
        let resolved = self.roots.resolve(location)?;
        let path = &resolved.absolute;
        let meta = std::fs::metadata(path).map_err(|e| StoreError::io(&resolved.relative, e))?;

        if meta.is_dir() {
            return directory_listing(path, &resolved.relative);
        }
        if meta.len() > self.max_file_bytes {
            return Err(StoreError::TooLarge {
                path: resolved.relative,
                size: meta.len(),
                max: self.max_file_bytes,
            });
        }

        let bytes = std::fs::read(path).map_err(|e| StoreError::io(&resolved.relative, e))?;
        let head = &bytes[..bytes.len().min(content_type::SNIFF_BYTES)];
        if content_type::detect(&resolved.relative, head) == ContentType::OctetStream {
            return Ok(binary_placeholder(&resolved.relative, bytes.len() as u64));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// The text shown in place of binary content.
pub fn binary_placeholder(location: &str, size: u64) -> String {
    format!("[binary content: {location}, {size} bytes]")
}

fn describe_observation(obs: &Observation) -> String {
    match &obs.content {
        Some(content) => content.clone(),
        None => format!("[{}] {}: {}", obs.observation_type, obs.path, obs.message),
    }
}

fn directory_listing(path: &Path, relative: &str) -> Result<String, StoreError> {
    let reader = std::fs::read_dir(path).map_err(|e| StoreError::io(relative, e))?;
    let mut entries: Vec<String> = reader
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                format!("{name}/")
            } else {
                name
            }
        })
        .collect();
    entries.sort();

    let mut listing = format!("Directory: {relative}/ ({} entries)", entries.len());
    for entry in entries {
        listing.push_str("\n  ");
        listing.push_str(&entry);
    }
    Ok(listing)
}

/// Lines `start..=end` (1-based). An open end runs to the last line.
pub fn slice_lines(content: &str, start: usize, end: Option<usize>) -> String {
    let start = start.max(1);
    let end = end.unwrap_or(usize::MAX);
    if end < start {
        return String::new();
    }
    content
        .lines()
        .skip(start - 1)
        .take(end - start + 1)
        .collect::<Vec<_>>()
        .join("\n")
}
