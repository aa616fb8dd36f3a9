use super::{evaluate_condition, execute};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::{Node, Value},
    LambdaError, LambdaResult,
};

const IF: &str = "if";
const ELSE_IF: &str = "else-if";
const ELSE: &str = "else";

fn is_branch(node: &Node) -> bool {
    node.has_name(IF) || node.has_name(ELSE_IF)
}

/// Whether a branch earlier in the chain ending before `node` already ran.
///
/// A branch that ran holds `true`. The chain must be an unbroken run of
/// `else-if` siblings back to an `if`.
fn chain_fired(node: &Node) -> LambdaResult<bool> {
    let broken = || {
        LambdaError::structural(format!(
            "[{}] must follow [{}] or [{}]",
            node.name(),
            IF,
            ELSE_IF
        ))
    };
    let mut cursor = node.previous_sibling().filter(is_branch).ok_or_else(broken)?;
    let mut fired = false;
    loop {
        fired |= matches!(cursor.value(), Some(Value::Bool(true)));
        if cursor.has_name(IF) {
            return Ok(fired);
        }
        cursor = cursor.previous_sibling().filter(is_branch).ok_or_else(broken)?;
    }
}

fn branch(ctx: &mut Context, node: &Node) -> LambdaResult<Flow> {
    let condition = evaluate_condition(ctx, node)?;
    if condition.value {
        execute(ctx, node, condition.offset)
    } else {
        Ok(Flow::Normal)
    }
}

fn if_(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    branch(ctx, e.args())
}

fn else_if(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    if chain_fired(e.args())? {
        return Ok(Flow::Normal);
    }
    branch(ctx, e.args())
}

fn else_(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    if args.has_value() {
        return Err(LambdaError::structural("[else] cannot have a condition"));
    }
    if chain_fired(args)? {
        return Ok(Flow::Normal);
    }
    execute(ctx, args, 0)
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.branching")
        .on(IF, if_)
        .on(ELSE_IF, else_if)
        .on(ELSE, else_)
}
