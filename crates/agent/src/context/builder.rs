//! Context builder: renders selected blocks into the reasoner payload.
//!
//! Each block becomes one [`ContextEntry`] carrying its loaded content and
//! the header fields the reasoner needs. Optional fields are only emitted
//! when they say something: confidence below 1.0, a line range, a digest,
//! a non-zero cycle. A block that fails to load becomes an error-marked
//! entry; the rest of the payload is unaffected. Content is never truncated.

use crate::context::token;
use cybermem_core::{ContentType, MemoryBlock, MemoryItem, short_digest};
use cybermem_memory::ContentLoader;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One block as the reasoner sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub content: String,
    pub content_type: ContentType,
    /// Priority name, e.g. `HIGH`.
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    /// First eight characters of the content digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_count: Option<u64>,
    /// Set when the content could not be loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The assembled working-memory context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPayload {
    pub entries: Vec<ContextEntry>,
    pub total_tokens: usize,
}

impl ContextPayload {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The payload as a JSON array of entries, for the reasoner request.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }

    /// A human-readable section.
    pub fn render(&self) -> String {
        let mut out = format!(
            "[Working Memory] {} blocks, ~{} tokens\n",
            self.entries.len(),
            self.total_tokens
        );
        for entry in &self.entries {
            let mut details = vec![entry.content_type.mime().to_string(), entry.priority.clone()];
            if let Some(confidence) = entry.confidence {
                details.push(format!("confidence {confidence:.2}"));
            }
            match (entry.start_line, entry.end_line) {
                (Some(start), Some(end)) => details.push(format!("lines {start}-{end}")),
                (Some(start), None) => details.push(format!("lines {start}-")),
                (None, Some(end)) => details.push(format!("lines 1-{end}")),
                (None, None) => {}
            }
            if let Some(digest) = &entry.digest {
                details.push(format!("digest {digest}"));
            }
            if let Some(cycle) = entry.cycle_count {
                details.push(format!("cycle {cycle}"));
            }

            out.push_str(&format!("\n--- {} ({}) ---\n", entry.id, details.join(", ")));
            match &entry.error {
                Some(error) => out.push_str(&format!("[unavailable: {error}]\n")),
                None => {
                    out.push_str(&entry.content);
                    if !entry.content.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
        out
    }
}

/// Stateless: create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, selected: &[&MemoryBlock], loader: &mut ContentLoader) -> ContextPayload {
        let mut payload = ContextPayload::default();
        for block in selected {
            let entry = match loader.load(block) {
                Ok(content) => Self::entry(block, content, None),
                Err(e) => {
                    warn!(id = block.id(), error = %e, "Block content unavailable");
                    Self::entry(block, String::new(), Some(e.to_string()))
                }
            };
            payload.total_tokens += token::estimate_block_tokens(&entry.content);
            payload.entries.push(entry);
        }
        payload
    }

    fn entry(block: &MemoryBlock, content: String, error: Option<String>) -> ContextEntry {
        let file = block.as_file();
        let confidence = block.confidence();
        let cycle = block.cycle_count();
        ContextEntry {
            id: block.id().to_string(),
            content,
            content_type: block.content_type(),
            priority: block.priority().name().to_string(),
            confidence: (confidence < 1.0).then_some(confidence),
            start_line: file.and_then(|f| f.start_line),
            end_line: file.and_then(|f| f.end_line),
            digest: file
                .and_then(|f| f.digest.as_deref())
                .map(|d| short_digest(d).to_string()),
            cycle_count: (cycle > 0).then_some(cycle),
            error,
        }
    }
}
