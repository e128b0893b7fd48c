//! Error types for the Cyber working-memory domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all cybermem operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Reasoner errors ---
    #[error("Reasoner error: {0}")]
    Reasoner(#[from] ReasonerError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors raised by the transactional store and the content loader.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied for '{path}': {reason}")]
    PermissionDenied { path: String, reason: String },

    #[error("Type mismatch on '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Range of {requested} lines exceeds the maximum of {max} lines")]
    RangeTooLarge { requested: usize, max: usize },

    #[error("File '{path}' is too large ({size} bytes, limit {max}); use a ranged read instead")]
    TooLarge { path: String, size: u64, max: u64 },

    #[error("Destination already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Serialization failed for '{path}': {reason}")]
    SerializationFailure { path: String, reason: String },

    #[error("Corrupted content in '{path}': {reason}")]
    CorruptedContent { path: String, reason: String },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl StoreError {
    /// Wrap an I/O error, mapping `NotFound` and `PermissionDenied` onto the taxonomy.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path,
                reason: err.to_string(),
            },
            _ => Self::Io {
                path,
                reason: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Invalid memory record: {0}")]
    InvalidRecord(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Missing root directory: {0}")]
    MissingRoot(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum ReasonerError {
    #[error("Reasoner request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed reasoner response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::RangeTooLarge {
            requested: 900,
            max: 500,
        });
        assert!(err.to_string().contains("900"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn io_not_found_maps_to_taxonomy() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            StoreError::io("personal/a.txt", io),
            StoreError::NotFound {
                path: "personal/a.txt".into()
            }
        );
    }

    #[test]
    fn too_large_points_at_ranged_read() {
        let err = StoreError::TooLarge {
            path: "grid/big.log".into(),
            size: 10,
            max: 5,
        };
        assert!(err.to_string().contains("ranged read"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "memory_write".into(),
            reason: "protected path".into(),
        });
        assert!(err.to_string().contains("memory_write"));
        assert!(err.to_string().contains("protected"));
    }
}
