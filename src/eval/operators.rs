//! Comparison and logical operators used inside conditions.

use std::cmp::Ordering;

use super::{all_values, evaluate_condition, exists, is_data, single_value, MAYBE, OPERATORS};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::{compare_values, is_truthy, Node, Value},
    LambdaError, LambdaResult,
};

const COMPARISONS: [&str; 8] = ["=", "!=", "<", ">", "<=", ">=", "~", "!~"];
const LOGICAL: [&str; 3] = ["or", "and", "not"];

fn conditional_parent(node: &Node) -> LambdaResult<Node> {
    node.parent().filter(|p| !p.has_name("")).ok_or_else(|| {
        LambdaError::structural(format!(
            "[{}] can only be used beneath a conditional node",
            node.name()
        ))
    })
}

/// Orders two operand lists: all-absent sides are equal, then shorter
/// sides first, then item by item.
fn compare_sides(lhs: &[Option<Value>], rhs: &[Option<Value>]) -> Ordering {
    let absent = |side: &[Option<Value>]| side.iter().all(Option::is_none);
    if absent(lhs) && absent(rhs) {
        return Ordering::Equal;
    }
    lhs.len().cmp(&rhs.len()).then_with(|| {
        lhs.iter()
            .zip(rhs)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

fn compared(node: &Node, test: fn(Ordering) -> bool) -> LambdaResult<Flow> {
    let parent = conditional_parent(node)?;
    let order = compare_sides(&all_values(&parent), &all_values(node));
    node.set_value(test(order));
    Ok(Flow::Normal)
}

fn equals(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_eq)
}

fn not_equals(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_ne)
}

fn less_than(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_lt)
}

fn more_than(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_gt)
}

fn less_than_equals(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_le)
}

fn more_than_equals(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    compared(e.args(), Ordering::is_ge)
}

fn text(node: &Node) -> String {
    single_value(node).map(|v| v.to_string()).unwrap_or_default()
}

fn contains(node: &Node) -> LambdaResult<bool> {
    let parent = conditional_parent(node)?;
    Ok(text(&parent).contains(&text(node)))
}

fn contains_text(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let found = contains(e.args())?;
    e.args().set_value(found);
    Ok(Flow::Normal)
}

fn lacks_text(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let found = contains(e.args())?;
    e.args().set_value(!found);
    Ok(Flow::Normal)
}

/// The conditional parent, its value coerced to a boolean, and the result a
/// logical operator works on: the closest statement sibling before it, or
/// the parent's own value when it leads.
fn previous_condition(node: &Node) -> LambdaResult<(Node, Node)> {
    let parent = conditional_parent(node)?;
    let had_value = parent.has_value();
    parent.set_value(exists(&parent));

    let mut cursor = node.previous_sibling();
    while let Some(sibling) = cursor {
        if !is_data(&sibling.name()) {
            return Ok((parent, sibling));
        }
        cursor = sibling.previous_sibling();
    }
    if had_value {
        Ok((parent.clone(), parent))
    } else {
        Err(LambdaError::structural(format!(
            "no previous condition found for [{}]",
            node.name()
        )))
    }
}

fn truth(node: &Node) -> bool {
    is_truthy(&node.value())
}

fn set_maybe(parent: &Node, value: bool) -> LambdaResult<()> {
    match parent.find(MAYBE) {
        Some(marker) => marker.set_value(value),
        None => parent.insert(0, Node::with_value(MAYBE, value))?,
    }
    Ok(())
}

fn clear_maybe(parent: &Node) -> LambdaResult<()> {
    for marker in parent.find_all(MAYBE) {
        marker.untie()?;
    }
    Ok(())
}

fn or(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let node = e.args();
    let (parent, previous) = previous_condition(node)?;
    if truth(&previous) {
        node.set_value(true);
        set_maybe(&parent, true)?;
    } else {
        let own = evaluate_condition(ctx, node)?.value;
        if own {
            set_maybe(&parent, false)?;
        } else {
            clear_maybe(&parent)?;
        }
    }
    Ok(Flow::Normal)
}

fn and(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let node = e.args();
    let (parent, previous) = previous_condition(node)?;
    let short_circuit = parent.find(MAYBE).is_some_and(|m| truth(&m));
    if short_circuit {
        node.set_value(true);
    } else if truth(&previous) {
        evaluate_condition(ctx, node)?;
    } else {
        node.set_value(false);
    }
    Ok(Flow::Normal)
}

fn not(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let node = e.args();
    let misplaced = node.count() > 0 || node.value().is_some_and(|v| v.as_bool().is_none());
    if misplaced {
        return Err(LambdaError::structural(
            "[not] takes neither children nor a value, it negates the previous condition",
        ));
    }
    let (parent, previous) = previous_condition(node)?;
    clear_maybe(&parent)?;
    node.set_value(!truth(&previous));
    Ok(Flow::Normal)
}

fn comparison_operators(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    for name in COMPARISONS {
        e.args().add_child(name);
    }
    Ok(Flow::Normal)
}

fn logical_operators(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    for name in LOGICAL {
        e.args().add_child(name);
    }
    Ok(Flow::Normal)
}

pub(super) fn comparison_unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.comparison")
        .on("=", equals)
        .on("!=", not_equals)
        .on("<", less_than)
        .on(">", more_than)
        .on("<=", less_than_equals)
        .on(">=", more_than_equals)
        .on("~", contains_text)
        .on("!~", lacks_text)
        .on(OPERATORS, comparison_operators)
}

pub(super) fn logical_unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.logical")
        .on("or", or)
        .on("and", and)
        .on("not", not)
        .on(OPERATORS, logical_operators)
}
