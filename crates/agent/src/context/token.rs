//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, plus a fixed
//! per-block overhead for the entry's framing (id, type, priority).

/// Framing cost charged to every block on top of its content.
pub const BLOCK_OVERHEAD_TOKENS: usize = 20;

/// Estimate the token count for a string. Rounds down.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Estimate the cost of one block whose loaded content is `content`.
pub fn estimate_block_tokens(content: &str) -> usize {
    estimate_tokens(content) + BLOCK_OVERHEAD_TOKENS
}
