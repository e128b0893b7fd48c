//! Memory blocks: symbolic references to content, never the content itself.
//!
//! A [`MemoryBlock`] is either a [`FileReference`] (a view onto a file under
//! one of the two namespace roots) or an [`Observation`] (a short event
//! summary produced by the scanner or the control loop). Both share a
//! [`BlockHeader`] and are accessed uniformly through [`MemoryItem`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::record::MemoryRecord;

/// Maximum size of inline observation content, in bytes.
pub const OBSERVATION_INLINE_MAX_BYTES: usize = 1024;

/// Open, string-keyed auxiliary data attached to a block (tags, descriptions).
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ── Priority ──────────────────────────────────────────────────────────────

/// Inclusion precedence. Lower value = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Foundational = 0,
    System = 1,
    Critical = 2,
    High = 3,
    Medium = 4,
    Low = 5,
}

impl Priority {
    pub const ALL: [Priority; 6] = [
        Priority::Foundational,
        Priority::System,
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// The canonical upper-case name used in snapshots and payloads.
    pub fn name(self) -> &'static str {
        match self {
            Self::Foundational => "FOUNDATIONAL",
            Self::System => "SYSTEM",
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority '{s}'"))
    }
}

// ── Content type ──────────────────────────────────────────────────────────

/// MIME-like tag describing what a block's content is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text/plain")]
    TextPlain,
    #[serde(rename = "text/markdown")]
    Markdown,
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/x-yaml")]
    Yaml,
    #[serde(rename = "application/x-cyber-message")]
    Message,
    #[serde(rename = "application/x-cyber-knowledge")]
    Knowledge,
    #[serde(rename = "application/octet-stream")]
    OctetStream,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            Self::TextPlain => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Json => "application/json",
            Self::Yaml => "application/x-yaml",
            Self::Message => "application/x-cyber-message",
            Self::Knowledge => "application/x-cyber-knowledge",
            Self::OctetStream => "application/octet-stream",
            Self::Unknown => "unknown",
        }
    }

    /// Whether content of this type is loaded as text.
    pub fn is_textual(self) -> bool {
        !matches!(self, Self::OctetStream)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim() {
            "text/plain" => Self::TextPlain,
            "text/markdown" => Self::Markdown,
            "application/json" => Self::Json,
            "application/x-yaml" | "application/yaml" => Self::Yaml,
            "application/x-cyber-message" => Self::Message,
            "application/x-cyber-knowledge" => Self::Knowledge,
            "application/octet-stream" => Self::OctetStream,
            "unknown" => Self::Unknown,
            other => return Err(format!("unknown content type '{other}'")),
        };
        Ok(ty)
    }
}

// ── Shared header ─────────────────────────────────────────────────────────

/// Fields common to every block variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: String,
    pub priority: Priority,
    pub content_type: ContentType,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub pinned: bool,
    pub cycle_count: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl BlockHeader {
    pub fn new(id: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            priority: Priority::Medium,
            content_type,
            confidence: 1.0,
            pinned: false,
            cycle_count: 0,
            timestamp: Some(Utc::now()),
            expiry: None,
            metadata: Metadata::new(),
        }
    }
}

/// Uniform access to a block regardless of its variant.
pub trait MemoryItem {
    fn header(&self) -> &BlockHeader;
    fn header_mut(&mut self) -> &mut BlockHeader;

    fn id(&self) -> &str {
        &self.header().id
    }

    fn priority(&self) -> Priority {
        self.header().priority
    }

    fn pinned(&self) -> bool {
        self.header().pinned
    }

    fn content_type(&self) -> ContentType {
        self.header().content_type
    }

    fn confidence(&self) -> f32 {
        self.header().confidence
    }

    fn cycle_count(&self) -> u64 {
        self.header().cycle_count
    }

    /// True when the block has an expiry at or before `now` and is not pinned.
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let header = self.header();
        !header.pinned && header.expiry.is_some_and(|exp| exp <= now)
    }
}

// ── Variants ──────────────────────────────────────────────────────────────

/// A view onto on-disk content under `personal/` or `grid/`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReference {
    pub header: BlockHeader,
    pub location: String,
    /// 1-based, inclusive.
    pub start_line: Option<usize>,
    /// 1-based, inclusive.
    pub end_line: Option<usize>,
    pub digest: Option<String>,
    /// Content must be re-read on every load.
    pub no_cache: bool,
}

impl FileReference {
    pub fn new(location: impl Into<String>, content_type: ContentType) -> Self {
        let location = location.into();
        Self {
            header: BlockHeader::new(location.clone(), content_type),
            location,
            start_line: None,
            end_line: None,
            digest: None,
            no_cache: false,
        }
    }

    /// Restrict the view to `start..=end` (1-based lines).
    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    /// Attach a content digest and suffix the id with its prefix.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        let digest = digest.into();
        self.header.id = format!("{}#{}", self.location, short_digest(&digest));
        self.digest = Some(digest);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn has_range(&self) -> bool {
        self.start_line.is_some() || self.end_line.is_some()
    }
}

impl MemoryItem for FileReference {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }
}

/// A short, self-contained event summary (file created, message arrived, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub header: BlockHeader,
    pub observation_type: String,
    pub path: String,
    pub message: String,
    /// Small inline payload, bounded by [`OBSERVATION_INLINE_MAX_BYTES`].
    pub content: Option<String>,
}

impl Observation {
    pub fn new(
        observation_type: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let observation_type = observation_type.into();
        let path = path.into();
        let message = message.into();
        let hash = content_digest(format!("{observation_type}\n{message}").as_bytes());
        let id = format!("{}#{}", path, short_digest(&hash));
        Self {
            header: BlockHeader::new(id, ContentType::TextPlain),
            observation_type,
            path,
            message,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.len() > OBSERVATION_INLINE_MAX_BYTES {
            let mut cut = OBSERVATION_INLINE_MAX_BYTES;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }
        self.content = Some(content);
        self
    }
}

impl MemoryItem for Observation {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }
}

// ── The tagged union ──────────────────────────────────────────────────────

/// A reference to content held by the registry.
///
/// Serializes through [`MemoryRecord`], the flat snapshot representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MemoryRecord", try_from = "MemoryRecord")]
pub enum MemoryBlock {
    File(FileReference),
    Observation(Observation),
}

impl MemoryItem for MemoryBlock {
    fn header(&self) -> &BlockHeader {
        match self {
            Self::File(f) => &f.header,
            Self::Observation(o) => &o.header,
        }
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        match self {
            Self::File(f) => &mut f.header,
            Self::Observation(o) => &mut o.header,
        }
    }
}

impl MemoryBlock {
    /// The snapshot `memory_class` tag for this variant.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::File(_) => crate::record::FILE_CLASS,
            Self::Observation(_) => crate::record::OBSERVATION_CLASS,
        }
    }

    /// The namespaced path this block refers to.
    pub fn location(&self) -> &str {
        match self {
            Self::File(f) => &f.location,
            Self::Observation(o) => &o.path,
        }
    }

    pub fn as_file(&self) -> Option<&FileReference> {
        match self {
            Self::File(f) => Some(f),
            Self::Observation(_) => None,
        }
    }

    /// Tags from `metadata.tags`, as an array of strings or a comma-separated string.
    pub fn tags(&self) -> Vec<String> {
        match self.header().metadata.get("tags") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Everything about the block a reader can see without loading content.
    pub fn visible_text(&self) -> String {
        let mut parts = vec![self.id().to_string(), self.location().to_string()];
        if let Self::Observation(o) = self {
            parts.push(o.observation_type.clone());
            parts.push(o.message.clone());
        }
        for (key, value) in &self.header().metadata {
            parts.push(key.clone());
            match value {
                serde_json::Value::String(s) => parts.push(s.clone()),
                other => parts.push(other.to_string()),
            }
        }
        parts.join(" ")
    }

    // ── Builders ──

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.header_mut().priority = priority;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.header_mut().confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn pin(mut self) -> Self {
        self.header_mut().pinned = true;
        self
    }

    pub fn at_cycle(mut self, cycle: u64) -> Self {
        self.header_mut().cycle_count = cycle;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.header_mut().timestamp = Some(timestamp);
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.header_mut().expiry = Some(expiry);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.header_mut().metadata.insert(key.into(), value);
        self
    }
}

impl From<FileReference> for MemoryBlock {
    fn from(f: FileReference) -> Self {
        Self::File(f)
    }
}

impl From<Observation> for MemoryBlock {
    fn from(o: Observation) -> Self {
        Self::Observation(o)
    }
}

// ── Digests ───────────────────────────────────────────────────────────────

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// The first eight characters of a digest, used in ids and payloads.
pub fn short_digest(digest: &str) -> &str {
    let end = digest
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(digest.len());
    &digest[..end]
}
