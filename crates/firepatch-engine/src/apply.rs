//! Applying patches to document trees.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use firepatch_models::{Fields, Value};
use tracing::debug;

use crate::error::PatchResult;
use crate::mask::MaskPolicy;
use crate::spec::{DeleteNode, DeleteSpec, ElementDelete, PatchSpec, ReplaceNode, ReplaceSpec};

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// The patched document.
    pub fields: Fields,
    /// Root keys that must be written back, per the mask policy.
    pub dirty: BTreeSet<String>,
    /// Whether a transform ran.
    pub transformed: bool,
}

/// Apply `spec` to a copy of `current` using the default mask policy.
pub fn apply(current: &Fields, spec: &mut PatchSpec) -> PatchResult<PatchOutcome> {
    apply_with_policy(current, spec, MaskPolicy::default())
}

/// Apply `spec` to a copy of `current`.
///
/// `current` is never modified; a rejected patch leaves no trace.
pub fn apply_with_policy(
    current: &Fields,
    spec: &mut PatchSpec,
    policy: MaskPolicy,
) -> PatchResult<PatchOutcome> {
    spec.validate()?;

    let mut fields = current.clone();
    let mut dirty = BTreeSet::new();

    for (key, node) in spec.replace_spec().iter() {
        if replace_entry(&mut fields, key, node) {
            dirty.insert(key.clone());
        }
    }

    for (key, node) in spec.delete_spec().iter() {
        if delete_entry(&mut fields, key, node) {
            dirty.insert(key.clone());
        }
    }

    let Some(transform) = spec.transform_mut() else {
        return Ok(PatchOutcome {
            fields,
            dirty,
            transformed: false,
        });
    };

    let fields = match policy {
        MaskPolicy::TouchedKeys => transform.transform(fields),
        MaskPolicy::TransformOutput => {
            let before: BTreeSet<String> = fields.keys().cloned().collect();
            let output = transform.transform(fields);
            dirty.extend(before);
            dirty.extend(output.keys().cloned());
            output
        }
        MaskPolicy::Diff => {
            let before = fields.clone();
            let output = transform.transform(fields);
            dirty.extend(changed_keys(&before, &output));
            output
        }
    };

    Ok(PatchOutcome {
        fields,
        dirty,
        transformed: true,
    })
}

/// Root keys added, removed or changed between two documents.
fn changed_keys(before: &Fields, after: &Fields) -> BTreeSet<String> {
    let removed_or_changed = before
        .iter()
        .filter(|(key, value)| after.get(*key) != Some(*value))
        .map(|(key, _)| key.clone());
    let added = after
        .keys()
        .filter(|key| !before.contains_key(*key))
        .cloned();
    removed_or_changed.chain(added).collect()
}

// =============================================================================
// Replace pass
// =============================================================================

/// Returns whether anything under `key` was written.
fn replace_entry(fields: &mut Fields, key: &str, node: &ReplaceNode) -> bool {
    match node {
        ReplaceNode::Value(value) => {
            fields.insert(key.to_string(), value.clone());
            true
        }
        ReplaceNode::Fields(inner) => match fields.get_mut(key) {
            Some(Value::Map(map)) => replace_fields(map, inner),
            Some(other) => {
                debug!(key, found = other.type_name(), "Skipping nested replace on non-map value");
                false
            }
            None => {
                let mut map = Fields::new();
                replace_fields(&mut map, inner);
                fields.insert(key.to_string(), Value::Map(map));
                true
            }
        },
        ReplaceNode::Elements(elements) => match fields.get_mut(key) {
            Some(Value::Array(items)) => replace_elements(items, elements),
            Some(other) => {
                debug!(key, found = other.type_name(), "Skipping element replace on non-list value");
                false
            }
            None => {
                // Only start a list if an element actually lands in it.
                let mut items = Vec::new();
                if !replace_elements(&mut items, elements) {
                    return false;
                }
                fields.insert(key.to_string(), Value::Array(items));
                true
            }
        },
    }
}

fn replace_fields(fields: &mut Fields, spec: &ReplaceSpec) -> bool {
    let mut touched = false;
    for (key, node) in spec.iter() {
        touched |= replace_entry(fields, key, node);
    }
    touched
}

fn replace_elements(items: &mut Vec<Value>, elements: &BTreeMap<usize, Value>) -> bool {
    let mut touched = false;
    for (&index, value) in elements {
        match index.cmp(&items.len()) {
            Ordering::Less => items[index] = value.clone(),
            Ordering::Equal => items.push(value.clone()),
            // Past the end, ignored.
            Ordering::Greater => continue,
        }
        touched = true;
    }
    touched
}

// =============================================================================
// Delete pass
// =============================================================================

/// Returns whether anything under `key` was removed.
fn delete_entry(fields: &mut Fields, key: &str, node: &DeleteNode) -> bool {
    match node {
        DeleteNode::Remove => fields.remove(key).is_some(),
        DeleteNode::Fields(inner) => match fields.get_mut(key) {
            Some(Value::Map(map)) => delete_fields(map, inner),
            _ => false,
        },
        DeleteNode::Elements(elements) => match fields.get_mut(key) {
            Some(Value::Array(items)) => delete_elements(items, elements),
            _ => false,
        },
    }
}

fn delete_fields(fields: &mut Fields, spec: &DeleteSpec) -> bool {
    let mut removed = false;
    for (key, node) in spec.iter() {
        removed |= delete_entry(fields, key, node);
    }
    removed
}

fn delete_elements(items: &mut Vec<Value>, elements: &BTreeMap<usize, ElementDelete>) -> bool {
    let mut removed = false;
    // Indices refer to the original list: descend first, then remove from
    // the highest index down.
    for (&index, op) in elements {
        if let (ElementDelete::Fields(inner), Some(Value::Map(map))) = (op, items.get_mut(index)) {
            removed |= delete_fields(map, inner);
        }
    }
    for (&index, op) in elements.iter().rev() {
        if matches!(op, ElementDelete::Remove) && index < items.len() {
            items.remove(index);
            removed = true;
        }
    }
    removed
}
