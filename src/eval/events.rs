//! Keywords managing script-declared events, and the catch-all that runs them.

use tracing::{debug, warn};

use super::{all_values, is_data, LAMBDA};
use crate::{
    event::{consume, Context, EventArgs, Flow, HandlerUnit, INITIALIZE_CONTEXT},
    tree::{Node, NodeSnapshot},
    LambdaError, LambdaResult,
};

const SUPER: &str = "super";

/// Event names given by the node's value, or by every value its selector yields.
fn names(args: &Node) -> LambdaResult<Vec<String>> {
    let names: Vec<String> = all_values(args)
        .into_iter()
        .flatten()
        .map(|v| v.to_string())
        .collect();
    if names.is_empty() {
        return Err(LambdaError::structural(format!(
            "[{}] needs the name of an event",
            args.name()
        )));
    }
    match names.iter().find(|n| is_data(n)) {
        Some(reserved) => Err(LambdaError::validation(format!(
            "'{}' cannot name an event",
            reserved
        ))),
        None => Ok(names),
    }
}

fn declare(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let names = names(args)?;
    let bodies: Vec<NodeSnapshot> = args
        .find_all(LAMBDA)
        .iter()
        .map(Node::snapshot)
        .collect();
    if bodies.is_empty() {
        return Err(LambdaError::structural(format!(
            "[event] needs at least one [{}] body",
            LAMBDA
        )));
    }
    for name in names {
        ctx.dynamic().declare(&name, bodies.clone());
    }
    Ok(Flow::Normal)
}

fn remove(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    for name in names(e.args())? {
        if !ctx.dynamic().remove(&name) {
            debug!("[remove-event] found nothing under [{}]", name);
        }
    }
    Ok(Flow::Normal)
}

fn supers(args: &Node) -> LambdaResult<Vec<String>> {
    let supers: Vec<String> = args
        .find_all(SUPER)
        .iter()
        .map(names)
        .collect::<LambdaResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    if supers.is_empty() {
        return Err(LambdaError::structural(format!(
            "[{}] needs at least one [{}]",
            args.name(),
            SUPER
        )));
    }
    Ok(supers)
}

fn override_(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let supers = supers(args)?;
    for base in names(args)? {
        for sup in &supers {
            ctx.dynamic().add_override(&base, sup)?;
            if let Err(err) = ctx.override_event(&base, sup) {
                ctx.dynamic().remove_override(&base, sup);
                return Err(err);
            }
        }
    }
    Ok(Flow::Normal)
}

fn remove_override(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let supers = supers(args)?;
    for base in names(args)? {
        for sup in &supers {
            ctx.remove_override(&base, sup);
            ctx.dynamic().remove_override(&base, sup);
        }
    }
    Ok(Flow::Normal)
}

fn call_base(ctx: &mut Context, _: &EventArgs) -> LambdaResult<Flow> {
    match ctx.current_base() {
        Some(base) => ctx.raise_direct(&base),
        None => Ok(Flow::Normal),
    }
}

fn list(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let args = e.args();
    let filters: Vec<String> = all_values(args)
        .into_iter()
        .flatten()
        .map(|v| v.to_string())
        .collect();
    let keep = |name: &str| filters.is_empty() || filters.iter().any(|f| name.contains(f.as_str()));
    let listed = [
        ("static", ctx.static_events()),
        ("instance", ctx.instance_events()),
        ("dynamic", ctx.dynamic().names()),
    ];
    for (origin, names) in listed {
        for name in names.iter().filter(|n| keep(n.as_str())) {
            args.add_value_child(origin, name.as_str());
        }
    }
    Ok(Flow::Normal)
}

/// Runs the declared bodies of whatever event was raised.
///
/// Each body is appended to the raised tree as a `lambda` child, so it
/// reaches the arguments as its parent, and is removed again afterwards.
fn invoke_declared(ctx: &mut Context, e: &EventArgs) -> LambdaResult<Flow> {
    let Some(bodies) = ctx.dynamic().bodies(e.name()) else {
        return Ok(Flow::Normal);
    };
    let args = e.args();
    let appended = bodies
        .iter()
        .map(NodeSnapshot::to_node)
        .collect::<LambdaResult<Vec<_>>>()?;
    for body in &appended {
        args.add(body.clone())?;
    }

    ctx.push_base(e.base().cloned());
    let mut outcome = Ok(Flow::Normal);
    for body in &appended {
        outcome = ctx.raise_flow(LAMBDA, body);
        if !matches!(outcome, Ok(Flow::Normal)) {
            break;
        }
    }
    ctx.pop_base();

    for body in &appended {
        if body.parent().is_some_and(|p| p.ptr_eq(args)) {
            body.untie()?;
        }
    }
    consume(args, outcome?)?;
    Ok(Flow::Normal)
}

fn replay_overrides(ctx: &mut Context, _: &EventArgs) -> LambdaResult<Flow> {
    for (base, sup) in ctx.dynamic().overrides() {
        if let Err(err) = ctx.override_event(&base, &sup) {
            warn!("skipped stored override [{}] -> [{}]: {}", base, sup, err);
        }
    }
    Ok(Flow::Normal)
}

pub(super) fn unit() -> HandlerUnit {
    HandlerUnit::new("arbor.core.events")
        .on("event", declare)
        .on("remove-event", remove)
        .on("override", override_)
        .on("remove-override", remove_override)
        .on("call-base", call_base)
        .on("list-events", list)
        .on(INITIALIZE_CONTEXT, replay_overrides)
        .on_any(invoke_declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RuntimeConfig,
        event::DynamicEvents,
        eval::testing::{context_with, selector},
        tree::Value,
        ErrorKind,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn store() -> Arc<DynamicEvents> {
        Arc::new(DynamicEvents::new())
    }

    fn log(label: &str) -> Node {
        Node::with_value("add", selector("/../_log"))
            .with_child(Node::new("src").with_child(Node::new(label)))
    }

    fn declare_event(ctx: &mut Context, name: &str, body: Vec<Node>) {
        let declaration =
            Node::with_value("event", name).with_child(Node::new(LAMBDA).with_children(body));
        ctx.raise("event", &declaration).unwrap();
    }

    fn logged(args: &Node) -> Vec<String> {
        args.find("_log")
            .map(|l| l.children().iter().map(Node::name).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_declared_twice_runs_both_in_order() {
        let dynamic = store();
        let mut ctx = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        declare_event(&mut ctx, "greet", vec![log("first")]);
        declare_event(&mut ctx, "greet", vec![log("second")]);

        let args = Node::new("greet").with_child(Node::new("_log"));
        ctx.raise("greet", &args).unwrap();
        assert_eq!(logged(&args), vec!["first", "second"]);
        assert_eq!(args.count(), 1);

        ctx.raise("remove-event", &Node::with_value("remove-event", "greet"))
            .unwrap();
        let args = Node::new("greet").with_child(Node::new("_log"));
        ctx.raise("greet", &args).unwrap();
        assert!(logged(&args).is_empty());
        assert!(dynamic.bodies("greet").is_none());
    }

    #[test]
    fn test_body_return_lands_on_args() {
        let mut ctx = context_with(store(), RuntimeConfig::default());
        declare_event(
            &mut ctx,
            "answer",
            vec![Node::with_value("return", 42).with_child(Node::with_value("unit", "none"))],
        );
        let args = ctx.raise("answer", &Node::new("answer")).unwrap();
        assert_eq!(args.value(), Some(Value::Int(42)));
        assert_eq!(args.find("unit").unwrap().value(), Some(Value::from("none")));
        assert!(args.find(LAMBDA).is_none());
    }

    #[test]
    fn test_declared_events_shared_across_contexts() {
        let dynamic = store();
        let mut first = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        declare_event(&mut first, "shared", vec![Node::with_value("return", "yes")]);
        let mut second = context_with(dynamic, RuntimeConfig::default());
        let args = second.raise("shared", &Node::new("shared")).unwrap();
        assert_eq!(args.value(), Some(Value::from("yes")));
    }

    #[test]
    fn test_override_with_call_base() {
        let dynamic = store();
        let mut ctx = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        declare_event(&mut ctx, "base", vec![log("base")]);
        declare_event(&mut ctx, "derived", vec![log("derived"), Node::new("call-base")]);
        ctx.raise(
            "override",
            &Node::with_value("override", "base").with_child(Node::with_value(SUPER, "derived")),
        )
        .unwrap();

        let args = Node::new("base").with_child(Node::new("_log"));
        ctx.raise("base", &args).unwrap();
        assert_eq!(logged(&args), vec!["derived", "base"]);

        let mut fresh = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        assert!(fresh.overrides().is_overridden("base"));
        let args = Node::new("base").with_child(Node::new("_log"));
        fresh.raise("base", &args).unwrap();
        assert_eq!(logged(&args), vec!["derived", "base"]);

        fresh
            .raise(
                "remove-override",
                &Node::with_value("remove-override", "base")
                    .with_child(Node::with_value(SUPER, "derived")),
            )
            .unwrap();
        assert!(!fresh.overrides().is_overridden("base"));
        assert!(dynamic.overrides().is_empty());
    }

    #[test]
    fn test_override_cycle_rejected() {
        let mut ctx = context_with(store(), RuntimeConfig::default());
        let link = |base: &str, sup: &str| {
            Node::with_value("override", base).with_child(Node::with_value(SUPER, sup))
        };
        ctx.raise("override", &link("a", "b")).unwrap();
        let err = ctx.raise("override", &link("b", "a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_stale_context_cannot_close_a_stored_cycle() {
        let dynamic = store();
        let link = |base: &str, sup: &str| {
            Node::with_value("override", base).with_child(Node::with_value(SUPER, sup))
        };
        let mut early = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        let mut late = context_with(Arc::clone(&dynamic), RuntimeConfig::default());
        late.raise("override", &link("a", "b")).unwrap();

        let err = early.raise("override", &link("b", "a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(!early.overrides().is_overridden("b"));
        assert_eq!(dynamic.overrides(), vec![("a".to_string(), "b".to_string())]);

        let fresh = context_with(dynamic, RuntimeConfig::default());
        assert!(fresh.overrides().is_overridden("a"));
        assert!(!fresh.overrides().is_overridden("b"));
    }

    #[test]
    fn test_runaway_recursion_is_exhausted() {
        let config = RuntimeConfig {
            max_depth: 48,
            ..RuntimeConfig::default()
        };
        let mut ctx = context_with(store(), config);
        declare_event(&mut ctx, "forever", vec![Node::new("forever")]);
        let err = ctx.raise("forever", &Node::new("forever")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(err.trace().iter().any(|t| t == "forever"));
    }

    #[test]
    fn test_list_events_filters() {
        let mut ctx = context_with(store(), RuntimeConfig::default());
        declare_event(&mut ctx, "my-event", vec![]);
        let args = ctx
            .raise("list-events", &Node::with_value("list-events", "event"))
            .unwrap();
        let listed: Vec<(String, String)> = args
            .children()
            .iter()
            .map(|n| (n.name(), n.value().map(|v| v.to_string()).unwrap_or_default()))
            .collect();
        assert!(listed.contains(&("static".to_string(), "remove-event".to_string())));
        assert!(listed.contains(&("dynamic".to_string(), "my-event".to_string())));
        assert!(!listed.iter().any(|(_, name)| name == "while"));
    }

    #[test]
    fn test_event_requires_body_and_name() {
        let mut ctx = context_with(store(), RuntimeConfig::default());
        let err = ctx
            .raise("event", &Node::with_value("event", "empty"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        let err = ctx
            .raise("event", &Node::new("event").with_child(Node::new(LAMBDA)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Structural);
        let err = ctx
            .raise(
                "event",
                &Node::with_value("event", "_hidden").with_child(Node::new(LAMBDA)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
