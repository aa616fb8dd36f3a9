mod concurrency;
mod programs;
mod tree_properties;

use std::sync::Arc;

use arbor::{core_loader, Context, DynamicEvents, Node, RuntimeConfig, Selector, Value};

pub fn context(dynamic: &Arc<DynamicEvents>) -> Context {
    core_loader(Arc::clone(dynamic), RuntimeConfig::default())
        .unwrap()
        .context()
        .unwrap()
}

pub fn selector(source: &str) -> Value {
    Value::Selector(Selector::parse(source).unwrap())
}

pub fn names(node: &Node) -> Vec<String> {
    node.children().iter().map(Node::name).collect()
}
