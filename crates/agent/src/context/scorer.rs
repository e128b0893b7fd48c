//! Relevance scoring: a 0..1 desirability score per block.
//!
//! `score = 0.3·confidence + 0.2·recency + 0.3·context + 0.2·keywords`
//!
//! - **recency** halves every half-life: 5 minutes for observations, one hour
//!   for file references, one day for knowledge (knowledge wins over variant)
//! - **context** starts at 0.5, +0.3 when the block sits at or under a recently
//!   accessed location, +0.2 when it mentions an active topic
//! - **keywords** is the fraction of task keywords found in the block's
//!   visible text and metadata

use chrono::{DateTime, Utc};
use cybermem_core::{ContentType, MemoryBlock, MemoryItem};

const WEIGHT_CONFIDENCE: f32 = 0.3;
const WEIGHT_RECENCY: f32 = 0.2;
const WEIGHT_CONTEXT: f32 = 0.3;
const WEIGHT_KEYWORDS: f32 = 0.2;

const HALF_LIFE_OBSERVATION_SECS: f64 = 5.0 * 60.0;
const HALF_LIFE_FILE_SECS: f64 = 60.0 * 60.0;
const HALF_LIFE_KNOWLEDGE_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Recency of a block with no timestamp.
const UNKNOWN_RECENCY: f32 = 0.5;

/// Everything the score depends on besides the block itself.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    task_keywords: Vec<String>,
    recent_locations: Vec<String>,
    active_topics: Vec<String>,
    now: DateTime<Utc>,
}

impl RelevanceScorer {
    pub fn new(task_keywords: &[String], recent_locations: &[String]) -> Self {
        Self {
            task_keywords: lowercase(task_keywords),
            recent_locations: recent_locations.to_vec(),
            active_topics: Vec::new(),
            now: Utc::now(),
        }
    }

    pub fn with_active_topics(mut self, topics: &[String]) -> Self {
        self.active_topics = lowercase(topics);
        self
    }

    /// Score as of `now` instead of the construction time.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn score(&self, block: &MemoryBlock) -> f32 {
        let text = block.visible_text().to_lowercase();
        let total = WEIGHT_CONFIDENCE * block.confidence()
            + WEIGHT_RECENCY * self.recency(block)
            + WEIGHT_CONTEXT * self.context(block, &text)
            + WEIGHT_KEYWORDS * self.keyword_overlap(&text);
        total.clamp(0.0, 1.0)
    }

    pub fn recency(&self, block: &MemoryBlock) -> f32 {
        let Some(timestamp) = block.header().timestamp else {
            return UNKNOWN_RECENCY;
        };
        let age = (self.now - timestamp).num_milliseconds().max(0) as f64 / 1000.0;
        0.5_f64.powf(age / half_life_secs(block)) as f32
    }

    fn context(&self, block: &MemoryBlock, text: &str) -> f32 {
        let mut score = 0.5;
        let location = block.location();
        if self
            .recent_locations
            .iter()
            .any(|recent| is_at_or_under(location, recent))
        {
            score += 0.3;
        }
        if self.active_topics.iter().any(|topic| text.contains(topic.as_str())) {
            score += 0.2;
        }
        f32::min(score, 1.0)
    }

    fn keyword_overlap(&self, text: &str) -> f32 {
        if self.task_keywords.is_empty() {
            return 0.0;
        }
        let found = self
            .task_keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        found as f32 / self.task_keywords.len() as f32
    }
}

fn half_life_secs(block: &MemoryBlock) -> f64 {
    if block.content_type() == ContentType::Knowledge {
        return HALF_LIFE_KNOWLEDGE_SECS;
    }
    match block {
        MemoryBlock::Observation(_) => HALF_LIFE_OBSERVATION_SECS,
        MemoryBlock::File(_) => HALF_LIFE_FILE_SECS,
    }
}

fn is_at_or_under(location: &str, recent: &str) -> bool {
    let recent = recent.trim_end_matches('/');
    location == recent
        || location
            .strip_prefix(recent)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn lowercase(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split free text into lowercase keywords of three or more characters.
pub fn keywords_from(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3)
    {
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cybermem_core::{FileReference, Observation};

    fn file(location: &str, ty: ContentType) -> MemoryBlock {
        FileReference::new(location, ty).into()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn half_lives_by_kind() {
        let now = Utc::now();
        let scorer = RelevanceScorer::new(&[], &[]).at(now);
        let hour_ago = now - Duration::hours(1);

        let f = file("grid/a.md", ContentType::Markdown).with_timestamp(hour_ago);
        assert!((scorer.recency(&f) - 0.5).abs() < 1e-4);

        let k = file("grid/k.yaml", ContentType::Knowledge).with_timestamp(now - Duration::hours(24));
        assert!((scorer.recency(&k) - 0.5).abs() < 1e-4);

        let o = MemoryBlock::from(Observation::new("file_created", "grid/x", "new"))
            .with_timestamp(now - Duration::minutes(5));
        assert!((scorer.recency(&o) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn knowledge_observation_uses_knowledge_half_life() {
        let now = Utc::now();
        let scorer = RelevanceScorer::new(&[], &[]).at(now);
        let mut obs = Observation::new("knowledge_added", "grid/knowledge/x.yaml", "fact");
        obs.header.content_type = ContentType::Knowledge;
        let block = MemoryBlock::from(obs).with_timestamp(now - Duration::hours(24));
        assert!((scorer.recency(&block) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn missing_timestamp_is_half() {
        let mut block = file("grid/a.md", ContentType::Markdown);
        block.header_mut().timestamp = None;
        assert_eq!(RelevanceScorer::new(&[], &[]).recency(&block), 0.5);
    }

    #[test]
    fn fresh_file_with_no_context_or_keywords() {
        let now = Utc::now();
        let block = file("grid/a.md", ContentType::Markdown).with_timestamp(now);
        let score = RelevanceScorer::new(&[], &[]).at(now).score(&block);
        // 0.3·1 + 0.2·1 + 0.3·0.5 + 0
        assert!((score - 0.65).abs() < 1e-4);
    }

    #[test]
    fn recent_location_and_topic_boost_context() {
        let now = Utc::now();
        let block = file("personal/projects/rust/plan.md", ContentType::Markdown)
            .with_timestamp(now)
            .with_metadata("description", serde_json::json!("Borrow checker notes"));

        let base = RelevanceScorer::new(&[], &[]).at(now).score(&block);
        let boosted = RelevanceScorer::new(&[], &strings(&["personal/projects"]))
            .with_active_topics(&strings(&["borrow checker"]))
            .at(now)
            .score(&block);
        assert!((boosted - base - 0.15).abs() < 1e-4);
    }

    #[test]
    fn location_prefix_needs_segment_boundary() {
        assert!(is_at_or_under("grid/board/a.md", "grid/board"));
        assert!(is_at_or_under("grid/board", "grid/board/"));
        assert!(!is_at_or_under("grid/boardroom/a.md", "grid/board"));
    }

    #[test]
    fn keyword_overlap_fraction() {
        let now = Utc::now();
        let block = file("grid/rust/ownership.md", ContentType::Markdown).with_timestamp(now);
        let scorer = RelevanceScorer::new(&strings(&["Rust", "python"]), &[]).at(now);
        let without = RelevanceScorer::new(&[], &[]).at(now);
        assert!((scorer.score(&block) - without.score(&block) - 0.1).abs() < 1e-4);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let now = Utc::now();
        let block = file("grid/a", ContentType::TextPlain)
            .with_timestamp(now + Duration::hours(5))
            .with_confidence(1.0);
        let score = RelevanceScorer::new(&strings(&["grid"]), &strings(&["grid"]))
            .with_active_topics(&strings(&["grid"]))
            .at(now)
            .score(&block);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn keywords_are_deduplicated() {
        assert_eq!(
            keywords_from("Fix the parser; the PARSER fails on YAML"),
            strings(&["fix", "the", "parser", "fails", "yaml"])
        );
    }
}
