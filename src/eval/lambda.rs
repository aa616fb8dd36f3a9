use super::{is_data, single_value};
use crate::{
    event::{consume, Context, EventArgs, Flow, HandlerUnit},
    tree::{Node, Value},
    LambdaResult,
};

pub const LAMBDA: &str = "lambda";
pub const EVAL: &str = "eval";

/// Executes the children of `scope` from `offset` on as statements.
///
/// Data segments are skipped. A statement may add or remove siblings: when it
/// is still attached, execution resumes after its current position, otherwise
/// at the position it used to hold. The first non-normal flow is returned.
pub fn execute(ctx: &mut Context, scope: &Node, offset: usize) -> LambdaResult<Flow> {
    let mut position = offset;
    while let Some(statement) = scope.child(position) {
        let name = statement.name();
        if !is_data(&name) {
            let flow = ctx.raise_flow(&name, &statement)?;
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        let attached = statement.parent().is_some_and(|p| p.ptr_eq(scope));
        position = match statement.index() {
            Some(index) if attached => index + 1,
            _ => position,
        };
    }
    Ok(Flow::Normal)
}

fn lambda(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    execute(ctx, e.args(), 0)
}

fn eval(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let targets = match args.value() {
        Some(Value::Selector(selector)) => selector.evaluate(args).nodes().to_vec(),
        Some(Value::Node(node)) => vec![node],
        _ => vec![args.clone()],
    };
    for target in targets {
        let body = target.deep_clone();
        let flow = execute(ctx, &body, 0)?;
        consume(args, flow)?;
    }
    Ok(Flow::Normal)
}

fn return_(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let returned = Node::new(args.name());
    if let Some(value) = single_value(args) {
        returned.set_value(value.deep_clone());
    }
    for child in args.children() {
        returned.add(child.deep_clone())?;
    }
    Ok(Flow::Return(returned))
}

fn break_(_: &mut Context, _: &EventArgs) -> LambdaResult<Flow> {
    Ok(Flow::Break)
}

fn continue_(_: &mut Context, _: &EventArgs) -> LambdaResult<Flow> {
    Ok(Flow::ContinueLoop)
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.lambda")
        .on(LAMBDA, lambda)
        .on(EVAL, eval)
        .on("return", return_)
        .on("break", break_)
        .on("continue", continue_)
}
