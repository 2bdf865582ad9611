//! Field-mask policy and field-path rendering.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::PatchError;

/// Which root keys are written back after a patch.
///
/// Keys touched by the replace and delete passes are always included. The
/// policies differ only in how keys changed by the transform are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Only keys touched by replace and delete. Transform edits to other
    /// keys stay local.
    TouchedKeys,
    /// Every root key of the transform output, plus keys it removed.
    #[default]
    TransformOutput,
    /// Root keys whose value the transform added, removed or changed.
    Diff,
}

impl MaskPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskPolicy::TouchedKeys => "touched",
            MaskPolicy::TransformOutput => "transform-output",
            MaskPolicy::Diff => "diff",
        }
    }
}

impl fmt::Display for MaskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskPolicy {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "touched" | "touched-keys" => Ok(MaskPolicy::TouchedKeys),
            "transform-output" | "transform_output" => Ok(MaskPolicy::TransformOutput),
            "diff" => Ok(MaskPolicy::Diff),
            other => Err(PatchError::UnknownMaskPolicy(other.to_string())),
        }
    }
}

/// Quote a field name for use in a field path.
///
/// Names matching `[A-Za-z_][A-Za-z0-9_]*` pass through; anything else is
/// wrapped in backquotes with `\` and `` ` `` escaped.
pub fn quote_field_path_segment(segment: &str) -> Cow<'_, str> {
    let mut chars = segment.chars();
    let simple = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if simple {
        Cow::Borrowed(segment)
    } else {
        let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
        Cow::Owned(format!("`{}`", escaped))
    }
}

/// Field paths for a set of dirty root keys.
pub fn field_paths<'a, I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter()
        .map(|key| quote_field_path_segment(key).into_owned())
        .collect()
}
