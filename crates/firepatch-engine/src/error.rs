//! Patch error types.

use thiserror::Error;

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors raised while building or validating a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The same position is addressed twice in incompatible ways, e.g. as a
    /// leaf in one entry and as a parent in another.
    #[error("Conflicting patch entries at {0}")]
    PathConflict(String),

    #[error("Patch path is empty")]
    EmptyPath,

    #[error("Unknown mask policy: {0}")]
    UnknownMaskPolicy(String),
}

impl PatchError {
    pub(crate) fn conflict(path: &[String]) -> Self {
        Self::PathConflict(render_path(path))
    }

    pub(crate) fn element_conflict(path: &[String], index: usize) -> Self {
        Self::PathConflict(format!("{}[{}]", render_path(path), index))
    }
}

/// `["a", "[3]", "b"]` renders as `a[3].b`.
fn render_path(path: &[String]) -> String {
    let mut rendered = String::new();
    for segment in path {
        if !rendered.is_empty() && !segment.starts_with('[') {
            rendered.push('.');
        }
        rendered.push_str(segment);
    }
    rendered
}
