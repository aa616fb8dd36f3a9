use tracing::debug;

use super::{evaluate_condition, execute};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::{Node, Value},
    LambdaError, LambdaResult,
};

/// Child of `for-each` holding the current item.
pub const ITEM: &str = "_dp";

/// Child of `while` lifting the iteration ceiling.
pub const UNCHECKED: &str = "_unchecked";

/// Puts back the value and children `node` had when `pristine` was taken.
fn restore(node: &Node, pristine: &Node) -> LambdaResult<()> {
    node.clear();
    node.replace_value(pristine.value().as_ref().map(Value::deep_clone));
    for child in pristine.children() {
        node.add(child.deep_clone())?;
    }
    Ok(())
}

fn unchecked(node: &Node) -> bool {
    node.find(UNCHECKED)
        .is_some_and(|n| n.value().and_then(|v| v.as_bool()) != Some(false))
}

fn run_while(ctx: &mut Context, args: &Node, pristine: &Node) -> LambdaResult<Flow> {
    let ceiling = (!unchecked(args)).then_some(ctx.config().max_iterations);
    let mut iterations = 0usize;
    loop {
        let condition = evaluate_condition(ctx, args)?;
        if !condition.value {
            return Ok(Flow::Normal);
        }
        iterations += 1;
        if let Some(max) = ceiling.filter(|max| iterations > *max) {
            return Err(LambdaError::exhausted(format!(
                "[while] exceeded {} iterations",
                max
            )));
        }
        debug!("[while] pass {}", iterations);
        let flow = execute(ctx, args, condition.offset)?;
        restore(args, pristine)?;
        match flow {
            Flow::Normal | Flow::ContinueLoop => {}
            Flow::Break => return Ok(Flow::Normal),
            returned @ Flow::Return(_) => return Ok(returned),
        }
    }
}

fn while_(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let pristine = args.deep_clone();
    let result = run_while(ctx, args, &pristine);
    restore(args, &pristine)?;
    result
}

fn items(args: &Node) -> LambdaResult<Vec<Option<Value>>> {
    match args.value() {
        Some(Value::Selector(selector)) => Ok(selector.evaluate(args).values()),
        Some(Value::Node(node)) => Ok(node
            .children()
            .into_iter()
            .map(|c| Some(Value::Node(c)))
            .collect()),
        Some(value) => Ok(vec![Some(value)]),
        None => Err(LambdaError::structural(
            "[for-each] needs a selector, a node or a value to iterate",
        )),
    }
}

fn run_for_each(
    ctx: &mut Context,
    args: &Node,
    pristine: &Node,
    items: Vec<Option<Value>>,
) -> LambdaResult<Flow> {
    for item in items {
        restore(args, pristine)?;
        let bound = Node::new(ITEM);
        if let Some(value) = item {
            bound.set_value(value.deep_clone());
        }
        args.insert(0, bound)?;
        match execute(ctx, args, 0)? {
            Flow::Normal | Flow::ContinueLoop => {}
            Flow::Break => break,
            returned @ Flow::Return(_) => return Ok(returned),
        }
    }
    Ok(Flow::Normal)
}

fn for_each(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let items = items(args)?;
    debug!("[for-each] over {} items", items.len());
    let pristine = args.deep_clone();
    let result = run_for_each(ctx, args, &pristine, items);
    restore(args, &pristine)?;
    result
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.loops")
        .on("while", while_)
        .on("for-each", for_each)
}
