//! Flat snapshot records for memory blocks.
//!
//! A [`MemoryRecord`] carries the common header plus every variant-specific
//! field as optional columns, tagged by `memory_class`. It is the on-disk
//! shape of a block inside the snapshot file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{
    BlockHeader, ContentType, FileReference, MemoryBlock, MemoryItem, Metadata, Observation,
    Priority,
};
use crate::error::MemoryError;

pub const FILE_CLASS: &str = "file_reference";
pub const OBSERVATION_CLASS: &str = "observation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_class: String,
    pub id: String,
    pub content_type: ContentType,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    pub priority: Priority,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub cycle_count: u64,
    #[serde(default)]
    pub metadata: Metadata,

    // file_reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_cache: bool,

    // observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

fn default_confidence() -> f32 {
    1.0
}

impl From<&MemoryBlock> for MemoryRecord {
    fn from(block: &MemoryBlock) -> Self {
        let h = block.header();
        let mut record = Self {
            memory_class: block.class_name().to_string(),
            id: h.id.clone(),
            content_type: h.content_type,
            confidence: h.confidence,
            priority: h.priority,
            timestamp: h.timestamp,
            expiry: h.expiry,
            pinned: h.pinned,
            cycle_count: h.cycle_count,
            metadata: h.metadata.clone(),
            location: None,
            start_line: None,
            end_line: None,
            digest: None,
            no_cache: false,
            observation_type: None,
            path: None,
            message: None,
            content: None,
        };
        match block {
            MemoryBlock::File(f) => {
                record.location = Some(f.location.clone());
                record.start_line = f.start_line;
                record.end_line = f.end_line;
                record.digest = f.digest.clone();
                record.no_cache = f.no_cache;
            }
            MemoryBlock::Observation(o) => {
                record.observation_type = Some(o.observation_type.clone());
                record.path = Some(o.path.clone());
                record.message = Some(o.message.clone());
                record.content = o.content.clone();
            }
        }
        record
    }
}

impl From<MemoryBlock> for MemoryRecord {
    fn from(block: MemoryBlock) -> Self {
        Self::from(&block)
    }
}

impl TryFrom<MemoryRecord> for MemoryBlock {
    type Error = MemoryError;

    fn try_from(r: MemoryRecord) -> Result<Self, Self::Error> {
        if r.id.trim().is_empty() {
            return Err(MemoryError::InvalidRecord("record has an empty id".into()));
        }
        let header = BlockHeader {
            id: r.id,
            priority: r.priority,
            content_type: r.content_type,
            confidence: r.confidence.clamp(0.0, 1.0),
            pinned: r.pinned,
            cycle_count: r.cycle_count,
            timestamp: r.timestamp,
            expiry: r.expiry,
            metadata: r.metadata,
        };
        match r.memory_class.as_str() {
            FILE_CLASS => {
                let location = r.location.ok_or_else(|| {
                    MemoryError::InvalidRecord(format!("{}: missing location", header.id))
                })?;
                Ok(MemoryBlock::File(FileReference {
                    header,
                    location,
                    start_line: r.start_line,
                    end_line: r.end_line,
                    digest: r.digest,
                    no_cache: r.no_cache,
                }))
            }
            OBSERVATION_CLASS => {
                let path = r.path.ok_or_else(|| {
                    MemoryError::InvalidRecord(format!("{}: missing path", header.id))
                })?;
                Ok(MemoryBlock::Observation(Observation {
                    header,
                    observation_type: r.observation_type.unwrap_or_default(),
                    path,
                    message: r.message.unwrap_or_default(),
                    content: r.content,
                }))
            }
            other => Err(MemoryError::InvalidRecord(format!(
                "unknown memory_class '{other}'"
            ))),
        }
    }
}
