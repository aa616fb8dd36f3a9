use tracing::debug;

use super::{execute, single_value};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::Node,
    LambdaError, LambdaResult,
};

/// Sentinel carrying a trapped error from `try` to the `catch` after it.
pub const CAUGHT: &str = "_caught";

const TRY: &str = "try";
const CATCH: &str = "catch";
const FINALLY: &str = "finally";

struct Handlers {
    catch: Option<Node>,
    finally: Option<Node>,
}

fn next_named(node: &Node, name: &str) -> Option<Node> {
    node.next_sibling().filter(|n| n.has_name(name))
}

/// A `try` must be followed by a `catch`, a `finally`, or both in that order.
fn verify(node: &Node) -> LambdaResult<Handlers> {
    let catch = next_named(node, CATCH);
    let finally = match &catch {
        Some(catch) => {
            if next_named(catch, CATCH).is_some() {
                return Err(LambdaError::structural("[try] can have at most one [catch]"));
            }
            next_named(catch, FINALLY)
        }
        None => next_named(node, FINALLY),
    };
    match &finally {
        None if catch.is_none() => Err(LambdaError::structural(
            "[try] must be followed by [catch], [finally] or both",
        )),
        Some(finally) if next_named(finally, CATCH).is_some() => Err(LambdaError::structural(
            "[catch] must come before [finally]",
        )),
        _ => Ok(Handlers { catch, finally }),
    }
}

/// Runs `finally` after `pending`; a non-normal flow from `finally` replaces it.
fn settle(ctx: &mut Context, finally: Option<&Node>, pending: LambdaResult<Flow>) -> LambdaResult<Flow> {
    let Some(finally) = finally else {
        return pending;
    };
    match execute(ctx, finally, 0)? {
        Flow::Normal => pending,
        replacing => Ok(replacing),
    }
}

fn sentinel(err: &LambdaError) -> Node {
    Node::new(CAUGHT).with_children([
        Node::with_value("message", err.message()),
        Node::with_value("type", err.kind().to_string()),
        Node::with_value("stack-trace", err.trace().join("\n")),
    ])
}

fn try_(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let handlers = verify(args)?;
    match execute(ctx, args, 0) {
        Ok(Flow::Normal) => Ok(Flow::Normal),
        Ok(flow) => settle(ctx, handlers.finally.as_ref(), Ok(flow)),
        Err(err) => match (&handlers.catch, args.parent()) {
            (Some(_), Some(parent)) => {
                debug!("[try] trapped {}", err);
                if let Some(stale) = parent.find(CAUGHT) {
                    stale.untie()?;
                }
                parent.insert(0, sentinel(&err))?;
                Ok(Flow::Normal)
            }
            _ => settle(ctx, handlers.finally.as_ref(), Err(err)),
        },
    }
}

fn catch(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let follows_try = args.previous_sibling().is_some_and(|n| n.has_name(TRY));
    let parent = args.parent().filter(|_| follows_try).ok_or_else(|| {
        LambdaError::structural("[catch] must directly follow [try]")
    })?;
    let Some(caught) = parent.find(CAUGHT) else {
        return Ok(Flow::Normal);
    };
    caught.untie()?;
    let details = caught.children();
    for (index, detail) in details.iter().enumerate() {
        args.insert(index, detail.clone())?;
    }
    let outcome = execute(ctx, args, details.len());
    for detail in &details {
        if detail.parent().is_some_and(|p| p.ptr_eq(args)) {
            detail.untie()?;
        }
    }
    match outcome {
        Ok(Flow::Normal) => Ok(Flow::Normal),
        pending => settle(ctx, next_named(args, FINALLY).as_ref(), pending),
    }
}

fn finally(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let valid = match args.previous_sibling() {
        Some(previous) if previous.has_name(TRY) => true,
        Some(previous) if previous.has_name(CATCH) => previous
            .previous_sibling()
            .is_some_and(|n| n.has_name(TRY)),
        _ => false,
    };
    if !valid {
        return Err(LambdaError::structural(
            "[finally] must follow [try] or a [catch] after [try]",
        ));
    }
    execute(ctx, args, 0)
}

fn throw(_: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let message = single_value(e.args())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unspecified error".to_string());
    Err(LambdaError::thrown(message))
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.exceptions")
        .on(TRY, try_)
        .on(CATCH, catch)
        .on(FINALLY, finally)
        .on("throw", throw)
}
