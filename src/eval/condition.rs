use std::collections::HashSet;

use super::{exists, is_data};
use crate::{
    event::Context,
    tree::{Node, Value},
    LambdaError, LambdaResult,
};

/// Transient marker an `or` leaves on its conditional node.
pub const MAYBE: &str = "_maybe";

/// Raised to collect the names of every condition operator.
pub const OPERATORS: &str = "operators";

/// Result of evaluating a conditional node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub value: bool,
    /// Index of the first child after the condition; the body starts here.
    pub offset: usize,
}

/// Evaluates the condition held by `node` and its leading operator children.
///
/// Without a value, the first statement child is raised as the condition.
/// Operator children follow; each is raised by name and its result becomes
/// the node's running value, so the next operator sees it as the previous
/// result. With no operators at all, the node's value is tested for
/// existence. The node's value is left as the resulting boolean.
pub fn evaluate_condition(ctx: &mut Context, node: &Node) -> LambdaResult<Condition> {
    let result = evaluate(ctx, node);
    let cleared = clear_maybe(node);
    let condition = result?;
    cleared?;
    Ok(condition)
}

fn operator_names(ctx: &mut Context) -> LambdaResult<HashSet<String>> {
    let collected = ctx.raise(OPERATORS, &Node::new(OPERATORS))?;
    Ok(collected.children().iter().map(Node::name).collect())
}

fn evaluate(ctx: &mut Context, node: &Node) -> LambdaResult<Condition> {
    let operators = operator_names(ctx)?;
    let children = node.children();
    let mut conditions = Vec::new();
    let mut offset = 0;

    if !node.has_value() {
        let implicit = children
            .iter()
            .position(|c| !is_data(&c.name()))
            .ok_or_else(|| {
                LambdaError::structural(format!("[{}] has nothing to use as a condition", node.name()))
            })?;
        conditions.push(children[implicit].clone());
        offset = implicit + 1;
    }
    for child in children.iter().skip(offset) {
        let name = child.name();
        if !is_data(&name) {
            if !operators.contains(&name) {
                break;
            }
            conditions.push(child.clone());
        }
        offset += 1;
    }

    let value = if conditions.is_empty() {
        exists(node)
    } else {
        for condition in &conditions {
            ctx.raise(&condition.name(), condition)?;
            node.replace_value(condition.value());
        }
        match node.value() {
            Some(Value::Bool(b)) => b,
            other => other.is_some(),
        }
    };
    node.set_value(value);
    Ok(Condition { value, offset })
}

fn clear_maybe(node: &Node) -> LambdaResult<()> {
    for marker in node.find_all(MAYBE) {
        marker.untie()?;
    }
    Ok(())
}
