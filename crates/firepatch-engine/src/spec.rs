//! Patch descriptions.
//!
//! Replace and delete specs are trees that mirror the document: map keys
//! are shared with the document structure and list elements are addressed
//! by index at the leaves. Trees are normally built through the
//! [`PatchSpec`] builder, which records the first conflicting entry so
//! that [`crate::apply`] can reject the whole patch before touching data.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;
use std::fmt;

use firepatch_models::{Fields, Value};

use crate::error::{PatchError, PatchResult};

/// Caller-supplied function run over the whole document after the replace
/// and delete passes. It may keep state between calls.
pub trait Transform: Send {
    fn transform(&mut self, fields: Fields) -> Fields;
}

impl<F> Transform for F
where
    F: FnMut(Fields) -> Fields + Send,
{
    fn transform(&mut self, fields: Fields) -> Fields {
        self(fields)
    }
}

// =============================================================================
// Replace
// =============================================================================

/// One entry of a replace tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceNode {
    /// Set the key to this value, whatever it held before.
    Value(Value),
    /// Descend into a map, creating it when the key is absent.
    Fields(ReplaceSpec),
    /// Set (`index < len`) or append (`index == len`) list elements, in
    /// ascending index order. Indices past the end are ignored.
    Elements(BTreeMap<usize, Value>),
}

/// Replace tree keyed by map key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceSpec {
    entries: BTreeMap<String, ReplaceNode>,
}

impl ReplaceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ReplaceNode> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ReplaceNode> {
        self.entries.iter()
    }

    /// Insert `node` at `path`, creating intermediate map entries.
    pub fn insert<I, S>(&mut self, path: I, node: ReplaceNode) -> PatchResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_path(&collect_path(path)?, node)
    }

    fn insert_path(&mut self, path: &[String], node: ReplaceNode) -> PatchResult<()> {
        let (last, parents) = path.split_last().ok_or(PatchError::EmptyPath)?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entries
                .entry(segment.clone())
                .or_insert_with(|| ReplaceNode::Fields(ReplaceSpec::new()));
            current = match entry {
                ReplaceNode::Fields(inner) => inner,
                _ => return Err(PatchError::conflict(&path[..=depth])),
            };
        }

        current.merge_entry(last.clone(), node, path)
    }

    fn merge_entry(&mut self, key: String, node: ReplaceNode, path: &[String]) -> PatchResult<()> {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), node) {
                (ReplaceNode::Fields(existing), ReplaceNode::Fields(incoming)) => {
                    for (key, node) in incoming.entries {
                        let child = child_path(path, &key);
                        existing.merge_entry(key, node, &child)?;
                    }
                    Ok(())
                }
                (ReplaceNode::Elements(existing), ReplaceNode::Elements(incoming)) => {
                    for (index, value) in incoming {
                        if existing.contains_key(&index) {
                            return Err(PatchError::element_conflict(path, index));
                        }
                        existing.insert(index, value);
                    }
                    Ok(())
                }
                _ => Err(PatchError::conflict(path)),
            },
        }
    }
}

// =============================================================================
// Delete
// =============================================================================

/// One entry of a delete tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteNode {
    /// Remove the key.
    Remove,
    /// Descend into a map. Absent or non-map values make this a no-op.
    Fields(DeleteSpec),
    /// Act on list elements by their index before any removal.
    Elements(BTreeMap<usize, ElementDelete>),
}

/// What to do with a single list element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementDelete {
    Remove,
    /// Delete inside a map element, keeping the element itself.
    Fields(DeleteSpec),
}

/// Delete tree keyed by map key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSpec {
    entries: BTreeMap<String, DeleteNode>,
}

impl DeleteSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DeleteNode> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, DeleteNode> {
        self.entries.iter()
    }

    /// Insert `node` at `path`, creating intermediate map entries.
    pub fn insert<I, S>(&mut self, path: I, node: DeleteNode) -> PatchResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_path(&collect_path(path)?, node)
    }

    fn insert_path(&mut self, path: &[String], node: DeleteNode) -> PatchResult<()> {
        let (last, parents) = path.split_last().ok_or(PatchError::EmptyPath)?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entries
                .entry(segment.clone())
                .or_insert_with(|| DeleteNode::Fields(DeleteSpec::new()));
            current = match entry {
                DeleteNode::Fields(inner) => inner,
                _ => return Err(PatchError::conflict(&path[..=depth])),
            };
        }

        current.merge_entry(last.clone(), node, path)
    }

    fn merge_entry(&mut self, key: String, node: DeleteNode, path: &[String]) -> PatchResult<()> {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), node) {
                (DeleteNode::Remove, DeleteNode::Remove) => Ok(()),
                (DeleteNode::Fields(existing), DeleteNode::Fields(incoming)) => {
                    existing.merge(incoming, path)
                }
                (DeleteNode::Elements(existing), DeleteNode::Elements(incoming)) => {
                    for (index, op) in incoming {
                        merge_element(existing, index, op, path)?;
                    }
                    Ok(())
                }
                _ => Err(PatchError::conflict(path)),
            },
        }
    }

    fn merge(&mut self, other: DeleteSpec, path: &[String]) -> PatchResult<()> {
        for (key, node) in other.entries {
            let child = child_path(path, &key);
            self.merge_entry(key, node, &child)?;
        }
        Ok(())
    }
}

fn merge_element(
    elements: &mut BTreeMap<usize, ElementDelete>,
    index: usize,
    op: ElementDelete,
    path: &[String],
) -> PatchResult<()> {
    match elements.entry(index) {
        Entry::Vacant(slot) => {
            slot.insert(op);
            Ok(())
        }
        Entry::Occupied(mut slot) => match (slot.get_mut(), op) {
            (ElementDelete::Remove, ElementDelete::Remove) => Ok(()),
            (ElementDelete::Fields(existing), ElementDelete::Fields(incoming)) => {
                existing.merge(incoming, &child_path(path, &format!("[{}]", index)))
            }
            _ => Err(PatchError::element_conflict(path, index)),
        },
    }
}

// =============================================================================
// PatchSpec
// =============================================================================

/// A complete mutation: replace, then delete, then transform.
#[derive(Default)]
pub struct PatchSpec {
    replace: ReplaceSpec,
    delete: DeleteSpec,
    transform: Option<Box<dyn Transform>>,
    invalid: Option<PatchError>,
}

impl PatchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch from prebuilt trees.
    pub fn from_parts(replace: ReplaceSpec, delete: DeleteSpec) -> Self {
        Self {
            replace,
            delete,
            ..Self::default()
        }
    }

    /// Set the value at `path`.
    pub fn replace<I, S, V>(mut self, path: I, value: V) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        V: Into<Value>,
    {
        let result = self.replace.insert(path, ReplaceNode::Value(value.into()));
        self.record(result)
    }

    /// Set or append elements of the list at `path`.
    pub fn replace_elements<I, S, E, V>(mut self, path: I, elements: E) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        E: IntoIterator<Item = (usize, V)>,
        V: Into<Value>,
    {
        let path = match collect_path(path) {
            Ok(path) => path,
            Err(e) => return self.record(Err(e)),
        };
        for (index, value) in elements {
            let node = ReplaceNode::Elements(BTreeMap::from([(index, value.into())]));
            let result = self.replace.insert_path(&path, node);
            self = self.record(result);
        }
        self
    }

    /// Remove the key at `path`.
    pub fn delete<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let result = self.delete.insert(path, DeleteNode::Remove);
        self.record(result)
    }

    /// Remove elements of the list at `path`. Indices refer to the list as
    /// it was before any of them is removed.
    pub fn delete_elements<I, S, E>(mut self, path: I, indices: E) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        E: IntoIterator<Item = usize>,
    {
        let elements = indices
            .into_iter()
            .map(|index| (index, ElementDelete::Remove))
            .collect();
        let result = self.delete.insert(path, DeleteNode::Elements(elements));
        self.record(result)
    }

    /// Remove `inner` from the map stored at `index` of the list at `path`.
    pub fn delete_element_fields<I, S, J, T>(mut self, path: I, index: usize, inner: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut nested = DeleteSpec::new();
        if let Err(e) = nested.insert(inner, DeleteNode::Remove) {
            return self.record(Err(e));
        }
        let node = DeleteNode::Elements(BTreeMap::from([(index, ElementDelete::Fields(nested))]));
        let result = self.delete.insert(path, node);
        self.record(result)
    }

    /// Run `transform` after the replace and delete passes.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn replace_spec(&self) -> &ReplaceSpec {
        &self.replace
    }

    pub fn delete_spec(&self) -> &DeleteSpec {
        &self.delete
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// True when applying the patch can never change a document.
    pub fn is_noop(&self) -> bool {
        self.replace.is_empty() && self.delete.is_empty() && self.transform.is_none()
    }

    /// Reject the patch if any position is addressed ambiguously, within
    /// one tree or across the replace and delete trees.
    pub fn validate(&self) -> PatchResult<()> {
        if let Some(e) = &self.invalid {
            return Err(e.clone());
        }
        check_overlap(&self.replace, &self.delete, &mut Vec::new())
    }

    pub(crate) fn transform_mut(&mut self) -> Option<&mut (dyn Transform + 'static)> {
        self.transform.as_deref_mut()
    }

    fn record(mut self, result: PatchResult<()>) -> Self {
        if let Err(e) = result {
            self.invalid.get_or_insert(e);
        }
        self
    }
}

impl fmt::Debug for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchSpec")
            .field("replace", &self.replace)
            .field("delete", &self.delete)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .field("invalid", &self.invalid)
            .finish()
    }
}

/// A key replaced with a plain value may also be removed, and list indices
/// may be both set and removed, since the passes run in a fixed order.
/// Every other overlap mixes a leaf with a parent.
fn check_overlap(replace: &ReplaceSpec, delete: &DeleteSpec, path: &mut Vec<String>) -> PatchResult<()> {
    for (key, replace_node) in replace.iter() {
        let Some(delete_node) = delete.get(key) else {
            continue;
        };
        path.push(key.clone());
        match (replace_node, delete_node) {
            (ReplaceNode::Value(_), DeleteNode::Remove)
            | (ReplaceNode::Elements(_), DeleteNode::Elements(_)) => {}
            (ReplaceNode::Fields(r), DeleteNode::Fields(d)) => check_overlap(r, d, path)?,
            _ => return Err(PatchError::conflict(path)),
        }
        path.pop();
    }
    Ok(())
}

fn collect_path<I, S>(path: I) -> PatchResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let path: Vec<String> = path.into_iter().map(Into::into).collect();
    if path.is_empty() {
        return Err(PatchError::EmptyPath);
    }
    Ok(path)
}

fn child_path(path: &[String], segment: &str) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(segment.to_string());
    child
}
