//! Path policy for cybermem: every store path goes through here.
//!
//! Provides:
//! - **Namespace resolution**: `personal/...` and `grid/...` map onto two roots
//! - **Traversal protection**: `..` segments never resolve
//! - **Write protection**: a reserved subtree is readable but never writable

pub mod path;

pub use path::{Namespace, NamespaceRoots, PathValidationError, ResolvedPath, DEFAULT_PROTECTED_MARKER};
