//! Path validation: maps namespaced store paths onto the two backing roots.
//!
//! Store paths look like `personal/notes/todo.md` or `/grid/board/post.md`.
//! Anything outside those two namespaces is rejected, `..` never resolves,
//! symlinks may not lead out of their root, and a reserved subtree (any
//! segment containing the protected marker) is readable but not writable.

use cybermem_core::error::StoreError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Segment marker of the read-only subtree.
pub const DEFAULT_PROTECTED_MARKER: &str = ".internal";

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' is outside the personal/ and grid/ namespaces")]
    InvalidNamespace { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is inside the protected '{marker}' subtree and cannot be modified")]
    Protected { path: String, marker: String },
}

impl From<PathValidationError> for StoreError {
    fn from(err: PathValidationError) -> Self {
        let path = match &err {
            PathValidationError::Empty => String::new(),
            PathValidationError::InvalidNamespace { path }
            | PathValidationError::PathTraversal { path }
            | PathValidationError::Protected { path, .. } => path.clone(),
        };
        StoreError::PermissionDenied {
            path,
            reason: err.to_string(),
        }
    }
}

/// One of the two namespace roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Private to this agent instance.
    Personal,
    /// Shared between agents.
    Grid,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Grid => "grid",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "personal" => Some(Self::Personal),
            "grid" => Some(Self::Grid),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A validated store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub namespace: Namespace,
    /// Normalized form, e.g. `personal/notes/todo.md`. Used as location and block id.
    pub relative: String,
    pub absolute: PathBuf,
    /// Inside the read-only subtree.
    pub protected: bool,
}

impl ResolvedPath {
    /// The final path segment, or the namespace name for a root.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.namespace.prefix())
    }
}

/// The two backing directories plus the protection policy.
#[derive(Debug, Clone)]
pub struct NamespaceRoots {
    personal: PathBuf,
    grid: PathBuf,
    protected_marker: String,
}

impl NamespaceRoots {
    pub fn new(personal: impl Into<PathBuf>, grid: impl Into<PathBuf>) -> Self {
        Self {
            personal: personal.into(),
            grid: grid.into(),
            protected_marker: DEFAULT_PROTECTED_MARKER.to_string(),
        }
    }

    /// Roots laid out as `<base>/personal` and `<base>/grid`.
    pub fn under(base: &Path) -> Self {
        Self::new(base.join("personal"), base.join("grid"))
    }

    pub fn with_protected_marker(mut self, marker: impl Into<String>) -> Self {
        self.protected_marker = marker.into();
        self
    }

    pub fn root(&self, namespace: Namespace) -> &Path {
        match namespace {
            Namespace::Personal => &self.personal,
            Namespace::Grid => &self.grid,
        }
    }

    pub fn protected_marker(&self) -> &str {
        &self.protected_marker
    }

    /// Root directories that do not exist on disk.
    pub fn missing_roots(&self) -> Vec<PathBuf> {
        [&self.personal, &self.grid]
            .into_iter()
            .filter(|p| !p.is_dir())
            .cloned()
            .collect()
    }

    /// Resolve a store path for reading.
    ///
    /// Accepts `personal/...` or `grid/...`, with or without a leading slash.
    /// Backslashes, empty and `.` segments are normalized away. The deepest
    /// existing part of the path is canonicalized and must stay under the
    /// canonical namespace root.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, PathValidationError> {
        let cleaned = raw.trim().replace('\\', "/");
        let segments: Vec<&str> = cleaned
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let Some((first, rest)) = segments.split_first() else {
            return Err(PathValidationError::Empty);
        };
        if segments.contains(&"..") {
            return Err(PathValidationError::PathTraversal { path: raw.into() });
        }
        let namespace = Namespace::from_segment(first)
            .ok_or_else(|| PathValidationError::InvalidNamespace { path: raw.into() })?;

        let mut absolute = self.root(namespace).to_path_buf();
        for segment in rest {
            absolute.push(segment);
        }
        let linked_into_protected = self.check_containment(namespace, &absolute, raw)?;
        let protected = linked_into_protected || self.is_marked(rest.iter().copied());

        Ok(ResolvedPath {
            namespace,
            relative: segments.join("/"),
            absolute,
            protected,
        })
    }

    fn is_marked<'a>(&self, mut segments: impl Iterator<Item = &'a str>) -> bool {
        !self.protected_marker.is_empty()
            && segments.any(|s| s.contains(self.protected_marker.as_str()))
    }

    /// Follow symlinks on the existing part of `absolute` and require the
    /// result to stay under the namespace root.
    ///
    /// Returns whether the canonical location lies in the protected subtree.
    /// A root that does not exist yet has nothing to follow.
    fn check_containment(
        &self,
        namespace: Namespace,
        absolute: &Path,
        raw: &str,
    ) -> Result<bool, PathValidationError> {
        let Ok(canonical_root) = self.root(namespace).canonicalize() else {
            return Ok(false);
        };
        let traversal = || PathValidationError::PathTraversal { path: raw.into() };

        for ancestor in absolute.ancestors() {
            if ancestor.symlink_metadata().is_err() {
                continue;
            }
            // Present but not canonicalizable: a dangling link.
            let canonical = ancestor.canonicalize().map_err(|_| traversal())?;
            let inside = canonical.strip_prefix(&canonical_root).map_err(|_| {
                tracing::warn!(path = raw, resolved = %canonical.display(), "Path escapes its namespace root");
                traversal()
            })?;
            return Ok(self.is_marked(inside.iter().filter_map(|c| c.to_str())));
        }
        Ok(false)
    }

    /// Resolve a store path for a mutation; the protected subtree is rejected.
    pub fn resolve_writable(&self, raw: &str) -> Result<ResolvedPath, PathValidationError> {
        let resolved = self.resolve(raw)?;
        if resolved.protected {
            tracing::warn!(path = %resolved.relative, "Write rejected on protected path");
            return Err(PathValidationError::Protected {
                path: resolved.relative,
                marker: self.protected_marker.clone(),
            });
        }
        Ok(resolved)
    }

    /// Map an absolute path under one of the roots back to its store path.
    pub fn relative_of(&self, absolute: &Path) -> Option<String> {
        [Namespace::Personal, Namespace::Grid]
            .into_iter()
            .find_map(|ns| {
                let rest = absolute.strip_prefix(self.root(ns)).ok()?;
                let mut parts = vec![ns.prefix().to_string()];
                parts.extend(
                    rest.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned()),
                );
                Some(parts.join("/"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> NamespaceRoots {
        NamespaceRoots::under(Path::new("/srv/cyber"))
    }

    #[test]
    fn personal_path_resolves() {
        let resolved = roots().resolve("personal/notes/todo.md").unwrap();
        assert_eq!(resolved.namespace, Namespace::Personal);
        assert_eq!(resolved.relative, "personal/notes/todo.md");
        assert_eq!(
            resolved.absolute,
            PathBuf::from("/srv/cyber/personal/notes/todo.md")
        );
        assert!(!resolved.protected);
        assert_eq!(resolved.file_name(), "todo.md");
    }

    #[test]
    fn leading_slash_and_dots_are_normalized() {
        let resolved = roots().resolve("/grid/./board//post.md").unwrap();
        assert_eq!(resolved.namespace, Namespace::Grid);
        assert_eq!(resolved.relative, "grid/board/post.md");
    }

    #[test]
    fn namespace_root_resolves() {
        let resolved = roots().resolve("/personal").unwrap();
        assert_eq!(resolved.relative, "personal");
        assert_eq!(resolved.absolute, PathBuf::from("/srv/cyber/personal"));
    }

    #[test]
    fn other_namespace_rejected() {
        let err = roots().resolve("/etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::InvalidNamespace { .. }));
        let store: StoreError = err.into();
        assert!(matches!(store, StoreError::PermissionDenied { .. }));
    }

    #[test]
    fn path_traversal_blocked() {
        let err = roots().resolve("personal/../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
    }

    #[test]
    fn empty_path_rejected() {
        assert_eq!(roots().resolve(" / ").unwrap_err(), PathValidationError::Empty);
    }

    #[test]
    fn protected_subtree_is_read_only() {
        let r = roots();
        let read = r.resolve("personal/.internal/identity.json").unwrap();
        assert!(read.protected);
        let err = r.resolve_writable("personal/.internal/identity.json").unwrap_err();
        assert!(matches!(err, PathValidationError::Protected { .. }));
        assert!(r.resolve_writable("personal/notes.md").is_ok());
    }

    #[test]
    fn custom_marker() {
        let r = roots().with_protected_marker("__system");
        assert!(r.resolve_writable("grid/__system/boot.yaml").is_err());
        assert!(r.resolve_writable("grid/.internal/x").is_ok());
    }

    #[test]
    fn relative_of_maps_back() {
        let r = roots();
        assert_eq!(
            r.relative_of(Path::new("/srv/cyber/grid/a/b.txt")).as_deref(),
            Some("grid/a/b.txt")
        );
        assert_eq!(r.relative_of(Path::new("/tmp/x")), None);
    }

    #[cfg(unix)]
    fn linked_roots() -> (tempfile::TempDir, tempfile::TempDir, NamespaceRoots) {
        let base = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(base.path().join("personal/.internal")).unwrap();
        std::fs::create_dir_all(base.path().join("grid/board")).unwrap();
        std::fs::write(outside.path().join("secret.txt"), "outside-root").unwrap();
        let roots = NamespaceRoots::under(base.path());
        (base, outside, roots)
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_rejected() {
        let (base, outside, r) = linked_roots();
        std::os::unix::fs::symlink(outside.path(), base.path().join("grid/link")).unwrap();

        for path in ["grid/link", "grid/link/secret.txt", "grid/link/new/planted.txt"] {
            let err = r.resolve(path).unwrap_err();
            assert!(matches!(err, PathValidationError::PathTraversal { .. }), "{path}");
        }
        assert!(r.resolve("grid/board/post.md").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_rejected() {
        let (base, outside, r) = linked_roots();
        let target = outside.path().join("not-yet");
        std::os::unix::fs::symlink(&target, base.path().join("grid/dangling")).unwrap();
        assert!(matches!(
            r.resolve_writable("grid/dangling").unwrap_err(),
            PathValidationError::PathTraversal { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_into_other_namespace_rejected() {
        let (base, _outside, r) = linked_roots();
        std::os::unix::fs::symlink(base.path().join("personal"), base.path().join("grid/mine")).unwrap();
        assert!(r.resolve("grid/mine/.internal").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_into_protected_subtree_is_protected() {
        let (base, _outside, r) = linked_roots();
        std::os::unix::fs::symlink(
            base.path().join("personal/.internal"),
            base.path().join("personal/alias"),
        )
        .unwrap();
        assert!(r.resolve("personal/alias/identity.json").unwrap().protected);
        assert!(matches!(
            r.resolve_writable("personal/alias/identity.json").unwrap_err(),
            PathValidationError::Protected { .. }
        ));
    }

    #[test]
    fn missing_roots_reported() {
        let dir = tempfile::tempdir().unwrap();
        let r = NamespaceRoots::under(dir.path());
        assert_eq!(r.missing_roots().len(), 2);
        std::fs::create_dir_all(dir.path().join("personal")).unwrap();
        std::fs::create_dir_all(dir.path().join("grid")).unwrap();
        assert!(r.missing_roots().is_empty());
    }
}
