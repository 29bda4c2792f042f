use crate::document::{Document, kind_type};
use crate::error::ArborError;
use crate::node::{ContainerKind, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How array and constructor children are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeArrayHandling {
    /// Append every incoming child.
    #[default]
    Concat,
    /// Append incoming children that are not deep-equal to one already present.
    Union,
    /// Drop existing children and take the incoming ones.
    Replace,
    /// Merge position by position, appending whatever is left over.
    Merge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeNullValueHandling {
    /// An incoming null never overwrites an existing value.
    #[default]
    Ignore,
    Merge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyNameComparison {
    #[default]
    Ordinal,
    IgnoreCase,
}

/// What happens when an incoming property already exists and the two
/// values cannot be merged recursively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyConflictHandling {
    #[default]
    Replace,
    KeepExisting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MergeSettings {
    pub array_handling: MergeArrayHandling,
    pub null_value_handling: MergeNullValueHandling,
    pub property_name_comparison: PropertyNameComparison,
    pub property_conflict: PropertyConflictHandling,
}

impl Document {
    /// Merges `source` (a node of `other`) into `target`.
    ///
    /// Both must be containers of the same kind, or both properties.
    /// Incoming content is always copied; `other` is left untouched.
    pub fn merge(
        &mut self,
        target: NodeId,
        other: &Document,
        source: NodeId,
        settings: Option<&MergeSettings>,
    ) -> Result<(), ArborError> {
        let defaults = MergeSettings::default();
        let settings = settings.unwrap_or(&defaults);
        debug!(%target, %source, ?settings.array_handling, "merging node");
        self.merge_with(target, other, source, settings)
    }

    /// Merges two nodes of this document. `source` is copied first so the
    /// merge can never observe its own output.
    pub fn merge_node(
        &mut self,
        target: NodeId,
        source: NodeId,
        settings: Option<&MergeSettings>,
    ) -> Result<(), ArborError> {
        let (snapshot, root) = self.subtree(source, None)?;
        self.merge(target, &snapshot, root, settings)
    }

    fn merge_with(
        &mut self,
        target: NodeId,
        other: &Document,
        source: NodeId,
        settings: &MergeSettings,
    ) -> Result<(), ArborError> {
        let target_kind = &self.node(target)?.kind;
        let source_kind = &other.node(source)?.kind;

        match (target_kind, source_kind) {
            (NodeKind::Container(t), NodeKind::Container(s)) if t.same_kind(s) => {
                let incoming = s.children.clone();
                match &s.kind {
                    ContainerKind::Constructor { name } => {
                        let name = name.clone();
                        self.set_name(target, &name)?;
                        self.merge_enumerable(target, other, &incoming, settings)
                    }
                    ContainerKind::Array => self.merge_enumerable(target, other, &incoming, settings),
                    ContainerKind::Object => self.merge_object(target, other, &incoming, settings),
                }
            }
            (NodeKind::Property { .. }, NodeKind::Property { value, .. }) => {
                let value = *value;
                self.merge_property_value(target, other, value, settings)
            }
            (t, s) => Err(ArborError::InvalidOperation(format!(
                "cannot merge {} into {}",
                kind_type(s),
                kind_type(t)
            ))),
        }
    }

    fn merge_enumerable(
        &mut self,
        target: NodeId,
        other: &Document,
        incoming: &[NodeId],
        settings: &MergeSettings,
    ) -> Result<(), ArborError> {
        match settings.array_handling {
            MergeArrayHandling::Concat => {
                for item in incoming {
                    let copy = self.import(other, *item, None)?;
                    self.add(target, copy)?;
                }
            }
            MergeArrayHandling::Union => {
                let mut seen: HashMap<u64, Vec<NodeId>> = HashMap::new();
                for existing in self.children(target)? {
                    seen.entry(self.deep_hash(*existing)?)
                        .or_default()
                        .push(*existing);
                }
                for item in incoming {
                    let hash = other.deep_hash(*item)?;
                    let duplicate = seen.get(&hash).is_some_and(|bucket| {
                        bucket
                            .iter()
                            .any(|existing| self.deep_equals_in(*existing, other, *item))
                    });
                    if duplicate {
                        continue;
                    }
                    let copy = self.import(other, *item, None)?;
                    self.add(target, copy)?;
                    seen.entry(hash).or_default().push(copy);
                }
            }
            MergeArrayHandling::Replace => {
                for old in self.clear(target)? {
                    self.discard(old)?;
                }
                for item in incoming {
                    let copy = self.import(other, *item, None)?;
                    self.add(target, copy)?;
                }
            }
            MergeArrayHandling::Merge => {
                for (index, item) in incoming.iter().enumerate() {
                    let existing = self.children(target)?.get(index).copied();
                    let Some(existing) = existing else {
                        let copy = self.import(other, *item, None)?;
                        self.add(target, copy)?;
                        continue;
                    };

                    if self.mergeable(existing, other, *item)? {
                        self.merge_with(existing, other, *item, settings)?;
                    } else if other.node(*item)?.is_null()
                        && settings.null_value_handling == MergeNullValueHandling::Ignore
                    {
                        continue;
                    } else {
                        let copy = self.import(other, *item, None)?;
                        let old = self.set_item(target, index, copy)?;
                        self.discard(old)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_object(
        &mut self,
        target: NodeId,
        other: &Document,
        incoming: &[NodeId],
        settings: &MergeSettings,
    ) -> Result<(), ArborError> {
        for property in incoming {
            let key = other.key_of(*property)?;
            match self.find_property(target, key, settings.property_name_comparison)? {
                Some(existing) => {
                    let value = other.value_of(*property)?;
                    self.merge_property_value(existing, other, value, settings)?;
                }
                None => {
                    let copy = self.import(other, *property, None)?;
                    self.add(target, copy)?;
                }
            }
        }
        Ok(())
    }

    fn merge_property_value(
        &mut self,
        property: NodeId,
        other: &Document,
        incoming: NodeId,
        settings: &MergeSettings,
    ) -> Result<(), ArborError> {
        let current = self.value_of(property)?;
        if self.mergeable(current, other, incoming)? {
            return self.merge_with(current, other, incoming, settings);
        }
        if settings.property_conflict == PropertyConflictHandling::KeepExisting {
            return Ok(());
        }
        if other.node(incoming)?.is_null()
            && settings.null_value_handling == MergeNullValueHandling::Ignore
        {
            return Ok(());
        }
        let copy = self.import(other, incoming, None)?;
        let old = self.set_property_node_value(property, copy)?;
        self.discard(old)
    }

    /// Both nodes are containers of the same kind.
    fn mergeable(&self, existing: NodeId, other: &Document, incoming: NodeId) -> Result<bool, ArborError> {
        let left = self.node(existing)?.as_container();
        let right = other.node(incoming)?.as_container();
        Ok(matches!((left, right), (Some(l), Some(r)) if l.same_kind(r)))
    }

    /// Looks a property up by key. Ignore-case lookups prefer an exact match.
    pub fn find_property(
        &self,
        object: NodeId,
        key: &str,
        comparison: PropertyNameComparison,
    ) -> Result<Option<NodeId>, ArborError> {
        if let Some(exact) = self.property(object, key)? {
            return Ok(Some(exact));
        }
        if comparison == PropertyNameComparison::Ordinal {
            return Ok(None);
        }
        for child in self.children(object)? {
            if self.key_of(*child)?.eq_ignore_ascii_case(key) {
                return Ok(Some(*child));
            }
        }
        Ok(None)
    }
}
