use std::cmp::Ordering;

use super::{execute, is_data, single_value};
use crate::{
    event::{Context, EventArgs, Flow, HandlerUnit},
    tree::compare_values,
    LambdaError, LambdaResult,
};

const CASE: &str = "case";
const DEFAULT: &str = "default";

fn switch(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let children = args.children();
    if let Some(stray) = children
        .iter()
        .find(|c| !c.has_name(CASE) && !c.has_name(DEFAULT) && !is_data(&c.name()))
    {
        return Err(LambdaError::structural(format!(
            "[switch] only takes [case] and [default], found [{}]",
            stray.name()
        )));
    }
    if children.iter().filter(|c| c.has_name(DEFAULT)).count() > 1 {
        return Err(LambdaError::structural("[switch] can have only one [default]"));
    }

    let value = single_value(args);
    let matched = children
        .iter()
        .position(|c| {
            c.has_name(CASE) && compare_values(&value, &single_value(c)) == Ordering::Equal
        })
        .or_else(|| children.iter().position(|c| c.has_name(DEFAULT)));

    // An empty case falls through to the next sibling with a body.
    let chosen = matched.and_then(|start| {
        children[start..]
            .iter()
            .filter(|c| c.has_name(CASE) || c.has_name(DEFAULT))
            .find(|c| c.count() > 0)
    });
    match chosen {
        Some(body) => execute(ctx, body, 0),
        None => Ok(Flow::Normal),
    }
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.switch").on("switch", switch)
}
