use serde::{Deserialize, Serialize};

use super::{Node, Selector, Value};
use crate::{LambdaError, LambdaResult};

/// Owned, thread-safe form of a tree, used by the process-wide event store
/// and for JSON input and output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SnapshotValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Node(Box<NodeSnapshot>),
    Selector(String),
}

impl NodeSnapshot {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    /// Parses JSON; a missing or null name is a validation error.
    pub fn from_json(json: &str) -> LambdaResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LambdaError::validation(format!("invalid tree: {}", e)))
    }

    pub fn to_json(&self) -> LambdaResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LambdaError::validation(format!("cannot serialize tree: {}", e)))
    }

    /// Rebuilds a live tree. Selector sources are parsed again.
    pub fn to_node(&self) -> LambdaResult<Node> {
        let node = Node::new(self.name.clone());
        if let Some(value) = &self.value {
            node.set_value(value.to_value()?);
        }
        for child in &self.children {
            node.add(child.to_node()?)?;
        }
        Ok(node)
    }
}

impl SnapshotValue {
    fn to_value(&self) -> LambdaResult<Value> {
        Ok(match self {
            SnapshotValue::Bool(b) => Value::Bool(*b),
            SnapshotValue::Int(i) => Value::Int(*i),
            SnapshotValue::Float(x) => Value::Float(*x),
            SnapshotValue::String(s) => Value::String(s.clone()),
            SnapshotValue::Node(n) => Value::Node(n.to_node()?),
            SnapshotValue::Selector(s) => Value::Selector(Selector::parse(s)?),
        })
    }
}

impl From<&Value> for SnapshotValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => SnapshotValue::Bool(*b),
            Value::Int(i) => SnapshotValue::Int(*i),
            Value::Float(x) => SnapshotValue::Float(*x),
            Value::String(s) => SnapshotValue::String(s.clone()),
            Value::Node(n) => SnapshotValue::Node(Box::new(n.snapshot())),
            Value::Selector(s) => SnapshotValue::Selector(s.source().to_string()),
        }
    }
}

impl Node {
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.name(),
            value: self.value().as_ref().map(SnapshotValue::from),
            children: self.children().iter().map(Node::snapshot).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_rebuilds_equal_tree() {
        let node = Node::new("set")
            .with_child(Node::with_value("src", 2.5))
            .with_child(Node::with_value("_nested", Node::with_value("inner", true)));
        node.set_value(Selector::parse("/../_x?value").unwrap());

        let rebuilt = node.snapshot().to_node().unwrap();
        assert_eq!(node, rebuilt);
        assert!(!node.ptr_eq(&rebuilt));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "name": "if",
            "value": {"bool": true},
            "children": [{"name": "lambda", "children": [{"name": "_x", "value": {"int": 1}}]}]
        }"#;
        let node = NodeSnapshot::from_json(json).unwrap().to_node().unwrap();
        assert_eq!(node.value(), Some(Value::Bool(true)));
        assert_eq!(
            node.first_child().unwrap().first_child().unwrap().value(),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_null_name_is_validation_error() {
        let err = NodeSnapshot::from_json(r#"{"name": null}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(NodeSnapshot::from_json(r#"{"children": []}"#).is_err());
    }

    #[test]
    fn test_bad_selector_is_validation_error() {
        let snapshot = NodeSnapshot {
            name: "set".into(),
            value: Some(SnapshotValue::Selector("oops".into())),
            children: vec![],
        };
        assert_eq!(
            snapshot.to_node().unwrap_err().kind(),
            crate::ErrorKind::Validation
        );
    }
}
