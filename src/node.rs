//! Read-only view over decoded hierarchical records
//!
//! The crawler only ever talks to [`HierarchicalNode`]. Each concrete record
//! representation implements it once; `serde_json::Value` is the one this
//! crate ships with.

use serde_json::Value;

/// Broad shape of a node, used by converters to accept or reject leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Null,
    Bool,
    Integer,
    Float,
    Text,
    Object,
    List,
}

/// A materialized leaf value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leaf<'a> {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(&'a str),
}

impl Leaf<'_> {
    pub fn category(&self) -> NodeCategory {
        match self {
            Leaf::Bool(_) => NodeCategory::Bool,
            Leaf::Integer(_) => NodeCategory::Integer,
            Leaf::Float(_) => NodeCategory::Float,
            Leaf::Text(_) => NodeCategory::Text,
        }
    }
}

/// Outcome of a named or indexed lookup
#[derive(Debug)]
pub enum Lookup<'a, N: ?Sized> {
    Found(&'a N),
    /// The accessor exists but holds no data
    Absent,
    /// The node's shape has no such accessor at all
    NoAccessor,
}

pub trait HierarchicalNode {
    fn category(&self) -> NodeCategory;

    /// Named child of an object node.
    fn child(&self, name: &str) -> Lookup<'_, Self>;

    /// Element of a list node. Out-of-range indexes are `Absent`; indexing
    /// anything but a list or null is `NoAccessor`.
    fn element(&self, index: usize) -> Lookup<'_, Self>;

    /// Number of elements of a list node, 0 for anything else.
    fn list_len(&self) -> usize;

    fn leaf(&self) -> Option<Leaf<'_>>;

    fn is_null(&self) -> bool {
        self.category() == NodeCategory::Null
    }
}

impl HierarchicalNode for Value {
    fn category(&self) -> NodeCategory {
        match self {
            Value::Null => NodeCategory::Null,
            Value::Bool(_) => NodeCategory::Bool,
            Value::Number(n) if n.is_i64() => NodeCategory::Integer,
            Value::Number(_) => NodeCategory::Float,
            Value::String(_) => NodeCategory::Text,
            Value::Array(_) => NodeCategory::List,
            Value::Object(_) => NodeCategory::Object,
        }
    }

    fn child(&self, name: &str) -> Lookup<'_, Self> {
        match self {
            Value::Object(map) => map.get(name).map_or(Lookup::Absent, Lookup::Found),
            Value::Null => Lookup::Absent,
            _ => Lookup::NoAccessor,
        }
    }

    fn element(&self, index: usize) -> Lookup<'_, Self> {
        match self {
            Value::Array(items) => items.get(index).map_or(Lookup::Absent, Lookup::Found),
            Value::Null => Lookup::Absent,
            _ => Lookup::NoAccessor,
        }
    }

    fn list_len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    fn leaf(&self) -> Option<Leaf<'_>> {
        match self {
            Value::Bool(b) => Some(Leaf::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Leaf::Integer(i)),
                None => n.as_f64().map(Leaf::Float),
            },
            Value::String(s) => Some(Leaf::Text(s)),
            _ => None,
        }
    }
}
