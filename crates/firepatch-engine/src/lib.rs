//! Patch engine for firepatch documents.
//!
//! A [`PatchSpec`] describes a mutation as three ordered passes:
//! 1. replace: set map keys, set or append list elements
//! 2. delete: remove map keys and list elements
//! 3. transform: an arbitrary caller function over the whole document
//!
//! [`apply`] runs them against a copy of the current document and reports
//! which root keys must be written back.

pub mod apply;
pub mod error;
pub mod mask;
pub mod spec;

pub use apply::{apply, apply_with_policy, PatchOutcome};
pub use error::{PatchError, PatchResult};
pub use mask::{field_paths, quote_field_path_segment, MaskPolicy};
pub use spec::{DeleteNode, DeleteSpec, ElementDelete, PatchSpec, ReplaceNode, ReplaceSpec, Transform};
