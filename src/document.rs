use crate::error::ArborError;
use crate::node::{
    Container, ContainerKind, Content, Key, LineInfo, Node, NodeId, NodeKind, NodeType, Scalar,
    canonical_float_bits,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Options for [`Document::clone_node`] and friends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CloneSettings {
    /// Copy the line/position a node was loaded from onto the clone.
    pub copy_line_info: bool,
}

/// Arena holding one or more document trees.
///
/// Nodes refer to each other by [`NodeId`]. A node's parent link is a
/// back-reference; the owning edge is the parent's child list. Nodes that
/// are removed from their container stay in the arena as detached roots
/// until they are re-inserted or [discarded](Document::discard).
#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next_node_id: u64,
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_node_id: 1,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes in the arena, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, ArborError> {
        self.nodes.get(&id).ok_or(ArborError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ArborError> {
        self.nodes.get_mut(&id).ok_or(ArborError::NodeNotFound(id))
    }

    pub(crate) fn container(&self, id: NodeId) -> Result<&Container, ArborError> {
        match &self.node(id)?.kind {
            NodeKind::Container(c) => Ok(c),
            other => Err(ArborError::InvalidOperation(format!(
                "cannot access child values on {}",
                kind_type(other)
            ))),
        }
    }

    fn container_mut(&mut self, id: NodeId) -> Result<&mut Container, ArborError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Container(c) => Ok(c),
            other => Err(ArborError::InvalidOperation(format!(
                "cannot access child values on {}",
                kind_type(other)
            ))),
        }
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind, line_info: Option<LineInfo>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                parent: None,
                kind,
                line_info,
            },
        );
        id
    }

    pub(crate) fn set_line_info(
        &mut self,
        id: NodeId,
        line_info: Option<LineInfo>,
    ) -> Result<(), ArborError> {
        self.node_mut(id)?.line_info = line_info;
        Ok(())
    }

    pub fn create_scalar(&mut self, value: impl Into<Scalar>) -> NodeId {
        self.alloc(NodeKind::Scalar(value.into()), None)
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()), None)
    }

    /// Opaque, already-encoded text written through unchanged.
    pub fn create_raw(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Raw(text.into()), None)
    }

    pub fn create_array(&mut self) -> NodeId {
        self.alloc(NodeKind::Container(Container::new(ContainerKind::Array)), None)
    }

    pub fn create_array_with(&mut self, content: impl Into<Content>) -> Result<NodeId, ArborError> {
        let id = self.create_array();
        self.add(id, content)?;
        Ok(id)
    }

    pub fn create_object(&mut self) -> NodeId {
        self.alloc(NodeKind::Container(Container::new(ContainerKind::Object)), None)
    }

    pub fn create_constructor(&mut self, name: &str) -> Result<NodeId, ArborError> {
        validate_constructor_name(name)?;
        Ok(self.alloc(
            NodeKind::Container(Container::new(ContainerKind::Constructor {
                name: name.to_string(),
            })),
            None,
        ))
    }

    pub fn create_constructor_with(
        &mut self,
        name: &str,
        content: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        let id = self.create_constructor(name)?;
        self.add(id, content)?;
        Ok(id)
    }

    /// Creates a detached property. Sequence content becomes an array value.
    pub fn create_property(
        &mut self,
        key: &str,
        value: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        let value = self.materialize_single(value.into())?;
        self.check_value_slot(value)?;
        self.detach(value)?;
        let id = self.alloc(
            NodeKind::Property {
                key: key.to_string(),
                value,
            },
            None,
        );
        self.node_mut(value)?.parent = Some(id);
        Ok(id)
    }

    fn materialize(&mut self, content: Content, out: &mut Vec<NodeId>) -> Result<(), ArborError> {
        match content {
            Content::Node(id) => {
                self.node(id)?;
                out.push(id);
            }
            Content::Scalar(s) => out.push(self.create_scalar(s)),
            Content::Many(items) => {
                for item in items {
                    self.materialize(item, out)?;
                }
            }
        }
        Ok(())
    }

    fn materialize_single(&mut self, content: Content) -> Result<NodeId, ArborError> {
        match content {
            Content::Many(_) => {
                let array = self.create_array();
                self.add(array, content)?;
                Ok(array)
            }
            Content::Node(id) => {
                self.node(id)?;
                Ok(id)
            }
            Content::Scalar(s) => Ok(self.create_scalar(s)),
        }
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, ArborError> {
        Ok(self.node(id)?.parent)
    }

    /// Walks parent links up to the topmost node.
    pub fn root_of(&self, id: NodeId) -> Result<NodeId, ArborError> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Ancestors from the immediate parent upwards.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, ArborError> {
        let mut out = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent)?.parent;
        }
        Ok(out)
    }

    /// All nodes below `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, ArborError> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id)?.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next)?.iter().rev().copied());
        }
        Ok(out)
    }

    fn is_self_or_ancestor(&self, candidate: NodeId, of: NodeId) -> Result<bool, ArborError> {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return Ok(true);
            }
            current = self.node(id)?.parent;
        }
        Ok(false)
    }

    /// Unlinks `id` from its parent, if any. A property never loses its
    /// value slot: detaching a property value leaves a null behind.
    pub(crate) fn detach(&mut self, id: NodeId) -> Result<(), ArborError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };

        let is_property = matches!(self.node(parent)?.kind, NodeKind::Property { .. });
        if is_property {
            let placeholder = self.create_scalar(Scalar::Null);
            self.node_mut(placeholder)?.parent = Some(parent);
            if let NodeKind::Property { value, .. } = &mut self.node_mut(parent)?.kind {
                *value = placeholder;
            }
        } else {
            let key = match &self.node(id)?.kind {
                NodeKind::Property { key, .. } => Some(key.clone()),
                _ => None,
            };
            let container = self.container_mut(parent)?;
            container.children.retain(|c| *c != id);
            if let (ContainerKind::Object, Some(key)) = (&container.kind, key) {
                container.keys.remove(&key);
            }
        }

        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Detaches `id` from its parent and returns whether it had one.
    pub fn remove(&mut self, id: NodeId) -> Result<bool, ArborError> {
        let had_parent = self.node(id)?.parent.is_some();
        self.detach(id)?;
        Ok(had_parent)
    }

    /// Drops a detached subtree from the arena.
    pub fn discard(&mut self, id: NodeId) -> Result<(), ArborError> {
        if self.node(id)?.parent.is_some() {
            return Err(ArborError::InvalidOperation(format!(
                "node {id} is still attached; remove it before discarding"
            )));
        }
        let mut doomed = self.descendants(id)?;
        doomed.push(id);
        for node in doomed {
            self.nodes.remove(&node);
        }
        Ok(())
    }

    /// Properties and comments cannot be property values.
    fn check_value_slot(&self, child: NodeId) -> Result<(), ArborError> {
        match self.node(child)?.kind {
            NodeKind::Property { .. } => Err(ArborError::InvalidArgument(
                "a property cannot hold another property as its value".to_string(),
            )),
            NodeKind::Comment(_) => Err(ArborError::InvalidArgument(
                "a property cannot hold a comment as its value".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn check_insert(&self, container: NodeId, child: NodeId) -> Result<(), ArborError> {
        let target = self.container(container)?;
        let child_node = self.node(child)?;

        if self.is_self_or_ancestor(child, container)? {
            return Err(ArborError::InvalidOperation(format!(
                "cannot add node {child} to itself or to one of its descendants"
            )));
        }

        match (&target.kind, &child_node.kind) {
            (ContainerKind::Object, NodeKind::Property { key, .. }) => {
                if let Some(existing) = target.property(key) {
                    if existing != child {
                        return Err(ArborError::InvalidArgument(format!(
                            "cannot add property {key} to Object: a property with the same name already exists"
                        )));
                    }
                }
                Ok(())
            }
            (ContainerKind::Object, other) => Err(ArborError::InvalidArgument(format!(
                "cannot add {} to Object",
                kind_type(other)
            ))),
            (_, NodeKind::Property { .. }) => Err(ArborError::InvalidArgument(format!(
                "cannot add Property to {}",
                target.node_type()
            ))),
            _ => Ok(()),
        }
    }

    /// Inserts before the node currently at `index`, or appends when
    /// `index` equals the child count. Moves `child` out of any previous
    /// parent first.
    fn insert_child(
        &mut self,
        container: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), ArborError> {
        let len = self.container(container)?.len();
        if index > len {
            return Err(ArborError::IndexOutOfRange { index, len });
        }
        self.check_insert(container, child)?;

        let anchor = self.container(container)?.children.get(index).copied();
        if anchor == Some(child) {
            return Ok(());
        }
        self.detach(child)?;

        let key = match &self.node(child)?.kind {
            NodeKind::Property { key, .. } => Some(key.clone()),
            _ => None,
        };
        let target = self.container_mut(container)?;
        let position = anchor
            .and_then(|a| target.index_of(a))
            .unwrap_or(target.children.len());
        target.children.insert(position, child);
        if let (ContainerKind::Object, Some(key)) = (&target.kind, key) {
            target.keys.insert(key, child);
        }
        self.node_mut(child)?.parent = Some(container);
        Ok(())
    }

    /// Appends content to a container.
    pub fn add(&mut self, container: NodeId, content: impl Into<Content>) -> Result<(), ArborError> {
        self.container(container)?;
        let mut ids = Vec::new();
        self.materialize(content.into(), &mut ids)?;
        for id in ids {
            let len = self.container(container)?.len();
            self.insert_child(container, len, id)?;
        }
        Ok(())
    }

    /// Inserts content at `index` of an array or constructor.
    pub fn insert(
        &mut self,
        container: NodeId,
        index: usize,
        content: impl Into<Content>,
    ) -> Result<(), ArborError> {
        self.positional(container)?;
        let len = self.container(container)?.len();
        if index > len {
            return Err(ArborError::IndexOutOfRange { index, len });
        }
        let mut ids = Vec::new();
        self.materialize(content.into(), &mut ids)?;
        for (offset, id) in ids.into_iter().enumerate() {
            self.insert_child(container, index + offset, id)?;
        }
        Ok(())
    }

    fn positional(&self, container: NodeId) -> Result<&Container, ArborError> {
        let c = self.container(container)?;
        if !c.is_positional() {
            return Err(ArborError::InvalidOperation(format!(
                "wrong accessor for container kind: {} values are not addressed by position",
                c.node_type()
            )));
        }
        Ok(c)
    }

    fn keyed(&self, container: NodeId) -> Result<&Container, ArborError> {
        let c = self.container(container)?;
        if c.is_positional() {
            return Err(ArborError::InvalidOperation(format!(
                "wrong accessor for container kind: {} values are not addressed by key",
                c.node_type()
            )));
        }
        Ok(c)
    }

    pub fn element_at(&self, container: NodeId, index: usize) -> Result<NodeId, ArborError> {
        let c = self.positional(container)?;
        c.children
            .get(index)
            .copied()
            .ok_or(ArborError::IndexOutOfRange {
                index,
                len: c.len(),
            })
    }

    /// Replaces the child at `index`. The previous occupant becomes a
    /// detached root and is returned.
    pub fn set_item(
        &mut self,
        container: NodeId,
        index: usize,
        content: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        let old = self.element_at(container, index)?;
        let new = self.materialize_single(content.into())?;
        if old == new {
            return Ok(old);
        }
        self.check_insert(container, new)?;
        self.detach(new)?;

        let target = self.container_mut(container)?;
        let position = target.index_of(old).ok_or(ArborError::NodeNotFound(old))?;
        target.children[position] = new;
        self.node_mut(old)?.parent = None;
        self.node_mut(new)?.parent = Some(container);
        Ok(old)
    }

    /// Removes and returns the child at `index`; it stays in the arena detached.
    pub fn remove_at(&mut self, container: NodeId, index: usize) -> Result<NodeId, ArborError> {
        let child = self.element_at(container, index)?;
        self.detach(child)?;
        Ok(child)
    }

    /// Detaches every child of a container.
    pub fn clear(&mut self, container: NodeId) -> Result<Vec<NodeId>, ArborError> {
        let children = self.container(container)?.children.clone();
        for child in &children {
            self.detach(*child)?;
        }
        Ok(children)
    }

    /// Puts `content` in the slot `id` occupies in its parent.
    pub fn replace_with(
        &mut self,
        id: NodeId,
        content: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        let parent = self.node(id)?.parent.ok_or_else(|| {
            ArborError::InvalidOperation(format!("node {id} has no parent to be replaced in"))
        })?;
        let replacement = self.materialize_single(content.into())?;
        if replacement == id {
            return Ok(id);
        }

        match &self.node(parent)?.kind {
            NodeKind::Property { .. } => {
                self.set_property_node_value(parent, replacement)?;
            }
            NodeKind::Container(c) if c.is_positional() => {
                let index = c.index_of(id).ok_or(ArborError::NodeNotFound(id))?;
                self.set_item(parent, index, replacement)?;
            }
            NodeKind::Container(c) => {
                let index = c.index_of(id).ok_or(ArborError::NodeNotFound(id))?;
                let clash = match &self.node(replacement)?.kind {
                    NodeKind::Property { key, .. } => c
                        .property(key)
                        .is_some_and(|existing| existing != id && existing != replacement),
                    other => {
                        return Err(ArborError::InvalidArgument(format!(
                            "cannot add {} to Object",
                            kind_type(other)
                        )));
                    }
                };
                if clash {
                    return Err(ArborError::InvalidArgument(
                        "cannot replace a property with one whose name already exists".to_string(),
                    ));
                }
                if self.is_self_or_ancestor(replacement, parent)? {
                    return Err(ArborError::InvalidOperation(format!(
                        "cannot add node {replacement} to itself or to one of its descendants"
                    )));
                }
                self.detach(replacement)?;
                self.detach(id)?;
                let index = index.min(self.container(parent)?.len());
                self.insert_child(parent, index, replacement)?;
            }
            other => {
                return Err(ArborError::InvalidOperation(format!(
                    "{} cannot have children",
                    kind_type(other)
                )));
            }
        }
        Ok(replacement)
    }

    pub fn set_name(&mut self, constructor: NodeId, name: &str) -> Result<(), ArborError> {
        validate_constructor_name(name)?;
        match &mut self.container_mut(constructor)?.kind {
            ContainerKind::Constructor { name: current } => {
                *current = name.to_string();
                Ok(())
            }
            _ => Err(ArborError::InvalidOperation(format!(
                "node {constructor} is not a constructor"
            ))),
        }
    }

    /// The property node for `key`, compared ordinally.
    pub fn property(&self, object: NodeId, key: &str) -> Result<Option<NodeId>, ArborError> {
        Ok(self.keyed(object)?.property(key))
    }

    pub fn property_value(&self, object: NodeId, key: &str) -> Result<Option<NodeId>, ArborError> {
        match self.property(object, key)? {
            Some(property) => self.value_of(property).map(Some),
            None => Ok(None),
        }
    }

    /// Sets `key` to `value`, replacing the value of an existing property.
    /// Returns the property node.
    pub fn set_property(
        &mut self,
        object: NodeId,
        key: &str,
        value: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        match self.property(object, key)? {
            Some(property) => {
                let value = self.materialize_single(value.into())?;
                self.set_property_node_value(property, value)?;
                Ok(property)
            }
            None => {
                let property = self.create_property(key, value)?;
                let len = self.container(object)?.len();
                self.insert_child(object, len, property)?;
                Ok(property)
            }
        }
    }

    pub fn remove_property(&mut self, object: NodeId, key: &str) -> Result<Option<NodeId>, ArborError> {
        let Some(property) = self.property(object, key)? else {
            return Ok(None);
        };
        self.detach(property)?;
        Ok(Some(property))
    }

    pub fn key_of(&self, property: NodeId) -> Result<&str, ArborError> {
        match &self.node(property)?.kind {
            NodeKind::Property { key, .. } => Ok(key),
            other => Err(ArborError::InvalidOperation(format!(
                "{} has no key",
                kind_type(other)
            ))),
        }
    }

    pub fn value_of(&self, property: NodeId) -> Result<NodeId, ArborError> {
        match &self.node(property)?.kind {
            NodeKind::Property { value, .. } => Ok(*value),
            other => Err(ArborError::InvalidOperation(format!(
                "{} has no single value",
                kind_type(other)
            ))),
        }
    }

    /// Replaces a property's value; the old value becomes a detached root
    /// and is returned.
    pub fn set_property_value(
        &mut self,
        property: NodeId,
        content: impl Into<Content>,
    ) -> Result<NodeId, ArborError> {
        let value = self.materialize_single(content.into())?;
        self.set_property_node_value(property, value)
    }

    pub(crate) fn set_property_node_value(
        &mut self,
        property: NodeId,
        value: NodeId,
    ) -> Result<NodeId, ArborError> {
        let old = self.value_of(property)?;
        if old == value {
            return Ok(old);
        }
        self.check_value_slot(value)?;
        if self.is_self_or_ancestor(value, property)? {
            return Err(ArborError::InvalidOperation(format!(
                "cannot add node {value} to itself or to one of its descendants"
            )));
        }
        self.detach(value)?;
        if let NodeKind::Property { value: slot, .. } = &mut self.node_mut(property)?.kind {
            *slot = value;
        }
        self.node_mut(old)?.parent = None;
        self.node_mut(value)?.parent = Some(property);
        Ok(old)
    }

    /// Indexed/keyed access: positions on arrays and constructors, names on
    /// objects. Returns `None` for a missing key.
    pub fn item(&self, id: NodeId, key: impl Into<Key>) -> Result<Option<NodeId>, ArborError> {
        match key.into() {
            Key::Index(index) => self.element_at(id, index).map(Some),
            Key::Name(name) => self.property_value(id, &name),
        }
    }

    /// Writes through the matching accessor and returns the node that
    /// previously held the slot, if any.
    pub fn set(
        &mut self,
        id: NodeId,
        key: impl Into<Key>,
        content: impl Into<Content>,
    ) -> Result<Option<NodeId>, ArborError> {
        match key.into() {
            Key::Index(index) => self.set_item(id, index, content).map(Some),
            Key::Name(name) => {
                let previous = self.property_value(id, &name)?;
                self.set_property(id, &name, content)?;
                Ok(previous)
            }
        }
    }

    /// Child nodes: container children, a property's single value, or
    /// nothing for leaves.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], ArborError> {
        Ok(match &self.node(id)?.kind {
            NodeKind::Container(c) => &c.children,
            NodeKind::Property { value, .. } => std::slice::from_ref(value),
            _ => &[],
        })
    }

    pub fn len(&self, id: NodeId) -> Result<usize, ArborError> {
        Ok(self.children(id)?.len())
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType, ArborError> {
        Ok(self.node(id)?.node_type())
    }

    pub fn scalar(&self, id: NodeId) -> Result<Option<&Scalar>, ArborError> {
        Ok(self.node(id)?.as_scalar())
    }

    /// Constructor name; `None` for every other kind.
    pub fn name(&self, id: NodeId) -> Result<Option<&str>, ArborError> {
        Ok(self.node(id)?.as_container().and_then(Container::name))
    }

    /// Location of `id` below its root, e.g. `orders[0].lines`.
    pub fn path(&self, id: NodeId) -> Result<String, ArborError> {
        let mut segments: Vec<String> = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            if let NodeKind::Property { key, .. } = &node.kind {
                segments.push(path_name(key));
            }
            if let Some(parent) = node.parent {
                if let NodeKind::Container(c) = &self.node(parent)?.kind {
                    if c.is_positional() {
                        if let Some(index) = c.index_of(node_id) {
                            segments.push(format!("[{index}]"));
                        }
                    }
                }
            }
            current = node.parent;
        }

        let mut out = String::new();
        for segment in segments.into_iter().rev() {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(&segment);
        }
        Ok(out)
    }

    pub fn deep_equals(&self, a: NodeId, b: NodeId) -> bool {
        self.deep_equals_in(a, self, b)
    }

    /// Structural, order-sensitive equality against a node of any document.
    pub fn deep_equals_in(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (Some(left), Some(right)) = (self.get(a), other.get(b)) else {
            return false;
        };
        match (&left.kind, &right.kind) {
            (NodeKind::Scalar(x), NodeKind::Scalar(y)) => x == y,
            (NodeKind::Comment(x), NodeKind::Comment(y)) => x == y,
            (NodeKind::Raw(x), NodeKind::Raw(y)) => x == y,
            (
                NodeKind::Property { key: ka, value: va },
                NodeKind::Property { key: kb, value: vb },
            ) => ka == kb && self.deep_equals_in(*va, other, *vb),
            (NodeKind::Container(x), NodeKind::Container(y)) => {
                x.kind == y.kind
                    && x.children.len() == y.children.len()
                    && x
                        .children
                        .iter()
                        .zip(&y.children)
                        .all(|(ca, cb)| self.deep_equals_in(*ca, other, *cb))
            }
            _ => false,
        }
    }

    fn write_canonical(&self, buf: &mut Vec<u8>, id: NodeId) -> Result<(), ArborError> {
        fn write_str(buf: &mut Vec<u8>, s: &str) {
            let len = s.len() as u64;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        }

        match &self.node(id)?.kind {
            NodeKind::Scalar(s) => match s {
                Scalar::Null => buf.push(0x01),
                Scalar::Undefined => buf.push(0x02),
                Scalar::Boolean(v) => {
                    buf.push(0x03);
                    buf.push(u8::from(*v));
                }
                Scalar::Integer(v) => {
                    buf.push(0x04);
                    buf.extend_from_slice(&v.to_be_bytes());
                }
                Scalar::Float(v) => {
                    buf.push(0x05);
                    buf.extend_from_slice(&canonical_float_bits(*v).to_be_bytes());
                }
                Scalar::String(v) => {
                    buf.push(0x06);
                    write_str(buf, v);
                }
                Scalar::Date(v) => {
                    buf.push(0x07);
                    write_str(buf, &v.to_rfc3339());
                }
                Scalar::Bytes(v) => {
                    buf.push(0x08);
                    let len = v.len() as u64;
                    buf.extend_from_slice(&len.to_be_bytes());
                    buf.extend_from_slice(v);
                }
                Scalar::Guid(v) => {
                    buf.push(0x09);
                    buf.extend_from_slice(v.as_bytes());
                }
            },
            NodeKind::Comment(text) => {
                buf.push(0x10);
                write_str(buf, text);
            }
            NodeKind::Raw(text) => {
                buf.push(0x11);
                write_str(buf, text);
            }
            NodeKind::Property { key, value } => {
                buf.push(0x12);
                write_str(buf, key);
                self.write_canonical(buf, *value)?;
            }
            NodeKind::Container(c) => {
                match &c.kind {
                    ContainerKind::Array => buf.push(0x20),
                    ContainerKind::Object => buf.push(0x21),
                    ContainerKind::Constructor { name } => {
                        buf.push(0x22);
                        write_str(buf, name);
                    }
                }
                let len = c.children.len() as u64;
                buf.extend_from_slice(&len.to_be_bytes());
                for child in &c.children {
                    self.write_canonical(buf, *child)?;
                }
            }
        }
        Ok(())
    }

    /// SHA-256 over the canonical encoding of the subtree at `id`.
    pub fn content_digest(&self, id: NodeId) -> Result<[u8; 32], ArborError> {
        let mut bytes = Vec::new();
        self.write_canonical(&mut bytes, id)?;

        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(out)
    }

    /// Structural hash: deep-equal subtrees always hash the same.
    pub fn deep_hash(&self, id: NodeId) -> Result<u64, ArborError> {
        let digest = self.content_digest(id)?;
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Ok(u64::from_be_bytes(head))
    }

    /// Deep-copies `id` into a new detached root of this document.
    pub fn clone_node(
        &mut self,
        id: NodeId,
        settings: Option<&CloneSettings>,
    ) -> Result<NodeId, ArborError> {
        let copy_line_info = settings.is_some_and(|s| s.copy_line_info);
        let node = self.node(id)?;
        let kind = node.kind.clone();
        let line_info = node.line_info.filter(|_| copy_line_info);

        let kind = match kind {
            NodeKind::Property { key, value } => NodeKind::Property {
                key,
                value: self.clone_node(value, settings)?,
            },
            NodeKind::Container(mut c) => {
                let mut cloned = Vec::with_capacity(c.children.len());
                for child in &c.children {
                    cloned.push(self.clone_node(*child, settings)?);
                }
                c.children = cloned;
                NodeKind::Container(c)
            }
            leaf => leaf,
        };
        self.adopt(kind, line_info)
    }

    /// Deep-copies a node of another document into this one as a detached root.
    pub fn import(
        &mut self,
        source: &Document,
        id: NodeId,
        settings: Option<&CloneSettings>,
    ) -> Result<NodeId, ArborError> {
        let copy_line_info = settings.is_some_and(|s| s.copy_line_info);
        let node = source.node(id)?;
        let line_info = node.line_info.filter(|_| copy_line_info);

        let kind = match &node.kind {
            NodeKind::Property { key, value } => NodeKind::Property {
                key: key.clone(),
                value: self.import(source, *value, settings)?,
            },
            NodeKind::Container(c) => {
                let mut copy = Container::new(c.kind.clone());
                for child in &c.children {
                    copy.children.push(self.import(source, *child, settings)?);
                }
                NodeKind::Container(copy)
            }
            leaf => leaf.clone(),
        };
        self.adopt(kind, line_info)
    }

    /// Copies the subtree at `id` into a fresh document.
    pub fn subtree(
        &self,
        id: NodeId,
        settings: Option<&CloneSettings>,
    ) -> Result<(Document, NodeId), ArborError> {
        let mut doc = Document::new();
        let root = doc.import(self, id, settings)?;
        Ok((doc, root))
    }

    /// Allocates a node whose child ids are fresh, unparented nodes and
    /// links them to it.
    fn adopt(&mut self, mut kind: NodeKind, line_info: Option<LineInfo>) -> Result<NodeId, ArborError> {
        if let NodeKind::Container(c) = &mut kind {
            c.keys.clear();
            if matches!(c.kind, ContainerKind::Object) {
                for child in &c.children {
                    if let NodeKind::Property { key, .. } = &self.node(*child)?.kind {
                        c.keys.insert(key.clone(), *child);
                    }
                }
            }
        }
        let children: Vec<NodeId> = match &kind {
            NodeKind::Container(c) => c.children.clone(),
            NodeKind::Property { value, .. } => vec![*value],
            _ => Vec::new(),
        };
        let id = self.alloc(kind, line_info);
        for child in children {
            self.node_mut(child)?.parent = Some(id);
        }
        Ok(id)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_constructor_name(name: &str) -> Result<(), ArborError> {
    if name.is_empty() {
        return Err(ArborError::InvalidArgument(
            "constructor name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn kind_type(kind: &NodeKind) -> NodeType {
    match kind {
        NodeKind::Scalar(s) => s.node_type(),
        NodeKind::Comment(_) => NodeType::Comment,
        NodeKind::Raw(_) => NodeType::Raw,
        NodeKind::Property { .. } => NodeType::Property,
        NodeKind::Container(c) => c.node_type(),
    }
}

fn path_name(key: &str) -> String {
    let plain = !key.is_empty()
        && !key
            .chars()
            .any(|c| matches!(c, '.' | ' ' | '[' | ']' | '(' | ')' | '\''));
    if plain {
        key.to_string()
    } else {
        format!("['{}']", key.replace('\'', "\\'"))
    }
}
