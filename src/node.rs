use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Handle to a node stored in a [`Document`](crate::Document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position a node was read from. Both fields are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineInfo {
    pub line: u32,
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Object,
    Array,
    Constructor,
    Property,
    Comment,
    Raw,
    Integer,
    Float,
    String,
    Boolean,
    Null,
    Undefined,
    Date,
    Bytes,
    Guid,
}

impl NodeType {
    pub fn is_container(self) -> bool {
        matches!(self, NodeType::Object | NodeType::Array | NodeType::Constructor)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Undefined,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    Guid(Uuid),
}

impl Scalar {
    pub fn node_type(&self) -> NodeType {
        match self {
            Scalar::Null => NodeType::Null,
            Scalar::Undefined => NodeType::Undefined,
            Scalar::Boolean(_) => NodeType::Boolean,
            Scalar::Integer(_) => NodeType::Integer,
            Scalar::Float(_) => NodeType::Float,
            Scalar::String(_) => NodeType::String,
            Scalar::Date(_) => NodeType::Date,
            Scalar::Bytes(_) => NodeType::Bytes,
            Scalar::Guid(_) => NodeType::Guid,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// Bit pattern used for float equality and hashing: both zeroes collapse
/// to one value and every NaN collapses to the canonical NaN.
pub(crate) fn canonical_float_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) | (Scalar::Undefined, Scalar::Undefined) => true,
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => {
                canonical_float_bits(*a) == canonical_float_bits(*b)
            }
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Date(a), Scalar::Date(b)) => a == b && a.offset() == b.offset(),
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a == b,
            (Scalar::Guid(a), Scalar::Guid(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Integer(v.into())
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Integer(v.into())
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<DateTime<FixedOffset>> for Scalar {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Scalar::Date(v)
    }
}

impl From<Uuid> for Scalar {
    fn from(v: Uuid) -> Self {
        Scalar::Guid(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Object,
    Constructor { name: String },
}

/// Ordered child list shared by arrays, objects and constructors.
///
/// Objects additionally index their properties by key; for the other
/// kinds `keys` stays empty.
#[derive(Debug, Clone)]
pub struct Container {
    pub(crate) kind: ContainerKind,
    pub(crate) children: Vec<NodeId>,
    pub(crate) keys: HashMap<String, NodeId>,
}

impl Container {
    pub(crate) fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            keys: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Constructor name, `None` for arrays and objects.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ContainerKind::Constructor { name } => Some(name),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            ContainerKind::Array => NodeType::Array,
            ContainerKind::Object => NodeType::Object,
            ContainerKind::Constructor { .. } => NodeType::Constructor,
        }
    }

    /// Arrays and constructors are addressed by position, objects by key.
    pub fn is_positional(&self) -> bool {
        !matches!(self.kind, ContainerKind::Object)
    }

    pub fn index_of(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }

    pub fn property(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    pub(crate) fn same_kind(&self, other: &Container) -> bool {
        self.node_type() == other.node_type()
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Scalar(Scalar),
    Comment(String),
    Raw(String),
    /// A key with exactly one value node.
    Property { key: String, value: NodeId },
    Container(Container),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) line_info: Option<LineInfo>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn line_info(&self) -> Option<LineInfo> {
        self.line_info
    }

    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Scalar(s) => s.node_type(),
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::Raw(_) => NodeType::Raw,
            NodeKind::Property { .. } => NodeType::Property,
            NodeKind::Container(c) => c.node_type(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match &self.kind {
            NodeKind::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_scalar().is_some_and(Scalar::is_null)
    }
}

/// Content accepted by the mutation API.
///
/// A single node is adopted as-is, a bare scalar is wrapped in a new
/// scalar node and a sequence is flattened element by element.
#[derive(Debug, Clone)]
pub enum Content {
    Node(NodeId),
    Scalar(Scalar),
    Many(Vec<Content>),
}

impl From<NodeId> for Content {
    fn from(id: NodeId) -> Self {
        Content::Node(id)
    }
}

impl From<Scalar> for Content {
    fn from(s: Scalar) -> Self {
        Content::Scalar(s)
    }
}

macro_rules! scalar_content {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Content {
                fn from(v: $t) -> Self {
                    Content::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_content!(bool, i64, i32, u32, f64, &str, String, DateTime<FixedOffset>, Uuid);

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Content::Many(items.into_iter().map(Into::into).collect())
    }
}

/// Accessor key: a position for arrays and constructors, a property name
/// for objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(n) => write!(f, "'{n}'"),
        }
    }
}
