//! Budgeted memory selection.
//!
//! Three strategies share the same pinned handling: pinned blocks are always
//! returned first, and if they alone exceed the budget nothing else is. The
//! running total `used` counts only admitted unpinned blocks; pinned tokens
//! are reserved separately.
//!
//! | Strategy | Order | Admission |
//! |----------|-------|-----------|
//! | balanced | priority asc, score desc | per-tier fraction of the budget |
//! | recent | timestamp desc | 95% of the budget |
//! | relevant | score desc | 90%, then HIGH backfill to three |

use cybermem_core::{MemoryBlock, MemoryItem, Priority};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// How many HIGH blocks the relevant strategy tries to keep.
const RELEVANT_MIN_HIGH: usize = 3;

/// A HIGH block scoring above this may use the squeeze allowance.
const SQUEEZE_SCORE: f32 = 0.8;
const SQUEEZE_FRACTION: f64 = 0.98;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    #[default]
    Balanced,
    Recent,
    Relevant,
}

impl SelectionStrategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Recent => "recent",
            Self::Relevant => "relevant",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "recent" => Ok(Self::Recent),
            "relevant" => Ok(Self::Relevant),
            other => Err(format!("unknown selection strategy '{other}'")),
        }
    }
}

/// A block up for selection, with its token estimate and relevance score.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub block: &'a MemoryBlock,
    pub tokens: usize,
    pub score: f32,
}

impl<'a> Candidate<'a> {
    pub fn new(block: &'a MemoryBlock, tokens: usize, score: f32) -> Self {
        Self {
            block,
            tokens,
            score,
        }
    }

    fn always_included(&self) -> bool {
        self.block.priority() <= Priority::Critical
    }
}

/// The outcome of one selection pass.
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    /// Pinned first, then admitted blocks in admission order.
    pub selected: Vec<Candidate<'a>>,
    pub pinned_tokens: usize,
    /// Tokens of admitted unpinned blocks.
    pub used_tokens: usize,
    /// Pinned blocks alone exceeded the budget.
    pub pinned_overflow: bool,
}

impl Selection<'_> {
    pub fn total_tokens(&self) -> usize {
        self.pinned_tokens + self.used_tokens
    }

    pub fn blocks(&self) -> Vec<&MemoryBlock> {
        self.selected.iter().map(|c| c.block).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.selected.iter().map(|c| c.block.id()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySelector {
    strategy: SelectionStrategy,
}

impl MemorySelector {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn select<'a>(&self, candidates: Vec<Candidate<'a>>, max_tokens: usize) -> Selection<'a> {
        let (pinned, unpinned): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| c.block.pinned());
        let pinned_tokens: usize = pinned.iter().map(|c| c.tokens).sum();

        let mut selection = Selection {
            selected: pinned,
            pinned_tokens,
            used_tokens: 0,
            pinned_overflow: false,
        };

        if pinned_tokens > max_tokens {
            warn!(
                pinned_tokens,
                max_tokens,
                pinned = selection.selected.len(),
                "Pinned blocks exceed the token budget, returning pinned blocks only"
            );
            selection.pinned_overflow = true;
            return selection;
        }

        let admitted = match self.strategy {
            SelectionStrategy::Balanced => balanced(unpinned, max_tokens),
            SelectionStrategy::Recent => recent(unpinned, max_tokens),
            SelectionStrategy::Relevant => relevant(unpinned, max_tokens),
        };
        selection.used_tokens = admitted.iter().map(|c| c.tokens).sum();
        selection.selected.extend(admitted);
        selection
    }
}

fn budget(max_tokens: usize, fraction: f64) -> f64 {
    max_tokens as f64 * fraction
}

fn fits(used: usize, tokens: usize, limit: f64) -> bool {
    (used + tokens) as f64 <= limit
}

fn by_score_desc(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.block.id().cmp(b.block.id()))
}

fn tier_fraction(priority: Priority) -> f64 {
    match priority {
        Priority::High => 0.8,
        Priority::Medium => 0.9,
        _ => 0.95,
    }
}

fn balanced(mut unpinned: Vec<Candidate<'_>>, max_tokens: usize) -> Vec<Candidate<'_>> {
    unpinned.sort_by(|a, b| {
        a.block
            .priority()
            .cmp(&b.block.priority())
            .then_with(|| by_score_desc(a, b))
    });

    let mut used = 0;
    let mut admitted = Vec::new();
    for candidate in unpinned {
        let priority = candidate.block.priority();
        let admit = candidate.always_included()
            || fits(used, candidate.tokens, budget(max_tokens, tier_fraction(priority)))
            || (priority == Priority::High
                && candidate.score > SQUEEZE_SCORE
                && fits(used, candidate.tokens, budget(max_tokens, SQUEEZE_FRACTION)));
        if admit {
            used += candidate.tokens;
            admitted.push(candidate);
        }
    }
    admitted
}

fn recent(unpinned: Vec<Candidate<'_>>, max_tokens: usize) -> Vec<Candidate<'_>> {
    let (mut admitted, mut rest): (Vec<_>, Vec<_>) =
        unpinned.into_iter().partition(|c| c.always_included());
    let mut used: usize = admitted.iter().map(|c| c.tokens).sum();

    // Newest first; blocks without a timestamp go last.
    rest.sort_by(|a, b| {
        b.block
            .header()
            .timestamp
            .cmp(&a.block.header().timestamp)
            .then_with(|| a.block.id().cmp(b.block.id()))
    });

    let limit = budget(max_tokens, 0.95);
    for candidate in rest {
        if fits(used, candidate.tokens, limit) {
            used += candidate.tokens;
            admitted.push(candidate);
        }
    }
    admitted
}

fn relevant(mut unpinned: Vec<Candidate<'_>>, max_tokens: usize) -> Vec<Candidate<'_>> {
    unpinned.sort_by(by_score_desc);

    let limit = budget(max_tokens, 0.9);
    let mut used = 0;
    let mut admitted = Vec::new();
    let mut skipped = Vec::new();
    for candidate in unpinned {
        if candidate.always_included() || fits(used, candidate.tokens, limit) {
            used += candidate.tokens;
            admitted.push(candidate);
        } else {
            skipped.push(candidate);
        }
    }

    let mut high = admitted
        .iter()
        .filter(|c| c.block.priority() == Priority::High)
        .count();
    for candidate in skipped {
        if high >= RELEVANT_MIN_HIGH {
            break;
        }
        if candidate.block.priority() == Priority::High
            && fits(used, candidate.tokens, max_tokens as f64)
        {
            used += candidate.tokens;
            high += 1;
            admitted.push(candidate);
        }
    }
    admitted
}
