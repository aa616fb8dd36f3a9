//! Keywords: every construct of the tree language is an ordinary handler.

mod branching;
mod condition;
mod data;
mod events;
mod exceptions;
mod lambda;
mod loops;
mod operators;
mod switch;

pub use condition::{evaluate_condition, Condition, MAYBE, OPERATORS};
pub use exceptions::CAUGHT;
pub use lambda::{execute, EVAL, LAMBDA};
pub use loops::{ITEM, UNCHECKED};

use crate::{
    event::HandlerUnit,
    tree::{is_truthy, MatchKind, Node, Value},
};

/// Handler units for every built-in keyword.
pub fn units() -> Vec<HandlerUnit> {
    vec![
        lambda::unit(),
        data::unit(),
        operators::comparison_unit(),
        operators::logical_unit(),
        branching::unit(),
        loops::unit(),
        exceptions::unit(),
        switch::unit(),
        events::unit(),
    ]
}

/// Children whose names are empty or start with `_` hold data, not statements.
pub fn is_data(name: &str) -> bool {
    name.is_empty() || name.starts_with('_')
}

/// The node's value, or the first value its selector yields.
pub fn single_value(node: &Node) -> Option<Value> {
    match node.value() {
        Some(Value::Selector(selector)) => selector.evaluate(node).values().into_iter().next().flatten(),
        other => other,
    }
}

/// Every value the node's selector yields, or its constant value.
pub fn all_values(node: &Node) -> Vec<Option<Value>> {
    match node.value() {
        Some(Value::Selector(selector)) => selector.evaluate(node).values(),
        Some(value) => vec![Some(value)],
        None => Vec::new(),
    }
}

/// Truthiness of a node's value; selectors test that their match is non-empty
/// and, for values and names, that the first one is set.
pub fn exists(node: &Node) -> bool {
    match node.value() {
        Some(Value::Selector(selector)) => {
            let matched = selector.evaluate(node);
            match matched.kind() {
                MatchKind::Node | MatchKind::Count => !matched.nodes().is_empty(),
                MatchKind::Name => matched.nodes().first().is_some_and(|n| !n.has_name("")),
                MatchKind::Value => matched.values().first().is_some_and(is_truthy),
            }
        }
        other => is_truthy(&other),
    }
}
