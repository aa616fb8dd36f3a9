use super::{is_data, single_value};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::{MatchKind, Node, Selector, Value},
    LambdaError, LambdaResult,
};

const SOURCE: &str = "src";

fn target(args: &Node) -> LambdaResult<Selector> {
    match args.value() {
        Some(Value::Selector(selector)) => Ok(selector),
        _ => Err(LambdaError::structural(format!(
            "[{}] needs a selector naming its destination",
            args.name()
        ))),
    }
}

/// Value carried by a source node: its own value, or its first child as a node.
fn carried(source: &Node) -> Option<Value> {
    match single_value(source) {
        Some(value) => Some(value),
        None => source.first_child().map(Value::Node),
    }
}

/// The value `set` writes: a `src` child, the result of raising its last
/// statement child, or nothing.
fn source(ctx: &mut Context, args: &Node) -> LambdaResult<Option<Value>> {
    if let Some(src) = args.find(SOURCE) {
        return Ok(carried(&src));
    }
    match args.last_child() {
        Some(statement) if !is_data(&statement.name()) => {
            let result = ctx.raise(&statement.name(), &statement)?;
            Ok(carried(&result))
        }
        _ => Ok(None),
    }
}

fn set(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let selector = target(args)?;
    let source = source(ctx, args)?;
    let matched = selector.evaluate(args);
    match matched.kind() {
        MatchKind::Value => {
            for node in matched.nodes() {
                node.replace_value(source.as_ref().map(Value::deep_clone));
            }
        }
        MatchKind::Name => {
            let name = source.map(|v| v.to_string()).unwrap_or_default();
            for node in matched.nodes() {
                node.set_name(name.clone());
            }
        }
        MatchKind::Node => {
            for node in matched.nodes() {
                match &source {
                    None => node.untie()?,
                    Some(Value::Node(replacement)) => node.replace(&replacement.deep_clone())?,
                    Some(other) => {
                        return Err(LambdaError::structural(format!(
                            "[set] cannot replace a node with the {} '{}'",
                            other.type_name(),
                            other
                        )))
                    }
                }
            }
        }
        MatchKind::Count => {
            return Err(LambdaError::evaluation(format!(
                "[set] cannot assign to the count selector '{}'",
                selector.source()
            )))
        }
    }
    Ok(Flow::Normal)
}

/// Nodes a `src` child of `add` contributes.
fn contributed(src: &Node) -> Vec<Node> {
    match src.value() {
        Some(Value::Selector(selector)) => {
            let matched = selector.evaluate(src);
            match matched.kind() {
                MatchKind::Node => matched.nodes().to_vec(),
                _ => matched
                    .values()
                    .into_iter()
                    .flatten()
                    .map(|value| Node::with_value("", value))
                    .collect(),
            }
        }
        Some(Value::Node(node)) => vec![node],
        _ => src.children(),
    }
}

fn add(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let selector = target(args)?;
    let matched = selector.evaluate(args);
    if matched.kind() != MatchKind::Node {
        return Err(LambdaError::structural(format!(
            "[add] destination '{}' must select nodes",
            selector.source()
        )));
    }
    let sources: Vec<Node> = args
        .find_all(SOURCE)
        .iter()
        .flat_map(contributed)
        .map(|n| n.deep_clone())
        .collect();
    for destination in matched.nodes() {
        for node in &sources {
            destination.add(node.deep_clone())?;
        }
    }
    Ok(Flow::Normal)
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.data")
        .on("set", set)
        .on("add", add)
}
