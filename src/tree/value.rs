use std::{cmp::Ordering, fmt};

use super::{Node, Selector};

/// Payload carried by a [`Node`].
#[derive(Debug, Clone, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A nested tree, held by handle. The nested node is expected to be a root.
    Node(Node),
    Selector(Selector),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        self.into()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_selector(&self) -> Option<&Selector> {
        match self {
            Value::Selector(s) => Some(s),
            _ => None,
        }
    }

    /// Copies nested trees instead of sharing their handles.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Node(n) => Value::Node(n.deep_clone()),
            other => other.clone(),
        }
    }
}

/// Absent values are falsy, booleans are themselves, anything else present is truthy.
pub fn is_truthy(value: &Option<Value>) -> bool {
    match value {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

/// Orders optional values with absence first.
pub fn compare_values(left: &Option<Value>, right: &Option<Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => l.cmp(r),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
            (Value::Int(l), Value::Int(r)) => l.cmp(r),
            (Value::Float(l), Value::Float(r)) => l.total_cmp(r),
            (Value::Int(l), Value::Float(r)) => (*l as f64).total_cmp(r),
            (Value::Float(l), Value::Int(r)) => l.total_cmp(&(*r as f64)),
            (Value::String(l), Value::String(r)) => l.cmp(r),
            (Value::Node(l), Value::Node(r)) => l.compare(r),
            (Value::Selector(l), Value::Selector(r)) => l.source().cmp(r.source()),
            _ => self.type_name().cmp(other.type_name()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Node(n) => write!(f, "{}", n.name()),
            Value::Selector(s) => write!(f, "{}", s.source()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}

impl From<Selector> for Value {
    fn from(s: Selector) -> Self {
        Value::Selector(s)
    }
}
