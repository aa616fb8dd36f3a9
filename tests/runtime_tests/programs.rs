use std::{any::Any, cell::Cell, rc::Rc, sync::Arc};

use arbor::{
    core_loader, Context, DynamicEvents, ErrorKind, EventArgs, Flow, HandlerUnit, LambdaResult,
    Node, NodeSnapshot, RuntimeConfig, Value,
};
use arbor::event::Listener;
use pretty_assertions::assert_eq;

use super::{context, names, selector};

const CLASSIFY: &str = r#"{
    "name": "eval",
    "children": [
        {"name": "_items", "children": [
            {"name": "", "value": {"int": 1}},
            {"name": "", "value": {"int": 3}},
            {"name": "", "value": {"int": 7}},
            {"name": "", "value": {"int": 9}}
        ]},
        {"name": "_small"},
        {"name": "_large"},
        {"name": "for-each", "value": {"selector": "/../_items/*?value"}, "children": [
            {"name": "if", "value": {"selector": "/./_dp?value"}, "children": [
                {"name": "<", "value": {"int": 5}},
                {"name": "add", "value": {"selector": "/../_small"}, "children": [
                    {"name": "src", "value": {"selector": "/./././_dp"}}
                ]}
            ]},
            {"name": "else", "children": [
                {"name": "add", "value": {"selector": "/../_large"}, "children": [
                    {"name": "src", "value": {"selector": "/./././_dp"}}
                ]}
            ]}
        ]},
        {"name": "return", "value": {"selector": "/../_large/*?count"}}
    ]
}"#;

#[test]
fn test_json_program_end_to_end() {
    let tree = NodeSnapshot::from_json(CLASSIFY).unwrap().to_node().unwrap();
    let before = tree.deep_clone();
    let mut ctx = context(&Arc::new(DynamicEvents::new()));
    let result = ctx.raise("eval", &tree).unwrap();

    assert_eq!(result.value(), Some(Value::Int(2)));
    // eval works on a copy, so the program itself only gains the returned value
    result.clear_value();
    assert_eq!(result, before);

    let json = result.snapshot().to_json().unwrap();
    assert!(json.contains("\"for-each\""));
}

#[test]
fn test_error_from_nested_events_carries_trace() {
    let dynamic = Arc::new(DynamicEvents::new());
    let mut ctx = context(&dynamic);
    for (name, body) in [
        ("inner", Node::with_value("throw", "deep failure")),
        ("outer", Node::new("inner")),
    ] {
        let declaration = Node::with_value("event", name).with_child(Node::new("lambda").with_child(body));
        ctx.raise("event", &declaration).unwrap();
    }

    let err = ctx.raise("outer", &Node::new("outer")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Thrown);
    assert_eq!(err.message(), "deep failure");
    let position = |name: &str| err.trace().iter().position(|t| t == name).unwrap();
    assert!(position("inner") < position("outer"));
}

#[test]
fn test_caller_catches_error_from_dynamic_event() {
    let dynamic = Arc::new(DynamicEvents::new());
    let mut ctx = context(&dynamic);
    let declaration = Node::with_value("event", "explode")
        .with_child(Node::new("lambda").with_child(Node::with_value("throw", "kaboom")));
    ctx.raise("event", &declaration).unwrap();

    let body = Node::new("eval").with_children([
        Node::new("try").with_child(Node::new("explode")),
        Node::new("catch").with_child(
            Node::with_value("return", selector("/./message?value")),
        ),
    ]);
    let result = ctx.raise("eval", &body).unwrap();
    assert_eq!(result.value(), Some(Value::from("kaboom")));
}

#[test]
fn test_dynamic_event_reads_its_arguments() {
    let dynamic = Arc::new(DynamicEvents::new());
    let mut ctx = context(&dynamic);
    let declaration = Node::with_value("event", "classify").with_child(
        Node::new("lambda").with_child(
            Node::with_value("switch", selector("/../_n?value")).with_children([
                Node::with_value("case", 1).with_child(Node::with_value("return", "one")),
                Node::with_value("case", 2).with_child(Node::with_value("return", "two")),
                Node::new("default").with_child(Node::with_value("return", "many")),
            ]),
        ),
    );
    ctx.raise("event", &declaration).unwrap();

    for (n, expected) in [(1, "one"), (2, "two"), (40, "many")] {
        let args = Node::new("classify").with_child(Node::with_value("_n", n));
        let result = ctx.raise("classify", &args).unwrap();
        assert_eq!(result.value(), Some(Value::from(expected)));
        assert_eq!(names(&result), vec!["_n"]);
    }
}

struct Ticker {
    hits: Cell<usize>,
}

impl Listener for Ticker {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn tick(this: &Ticker, _: &mut Context, _: &EventArgs) -> LambdaResult<Flow> {
    this.hits.set(this.hits.get() + 1);
    Ok(Flow::Normal)
}

#[test]
fn test_listener_handlers_driven_by_script() {
    let loader = core_loader(Arc::new(DynamicEvents::new()), RuntimeConfig::default()).unwrap();
    loader
        .load_unit(HandlerUnit::new("test.ticker").listener::<Ticker>("tick", tick))
        .unwrap();
    let mut ctx = loader.context().unwrap();
    let ticker = Rc::new(Ticker { hits: Cell::new(0) });
    let listener: Rc<dyn Listener> = ticker.clone();
    ctx.register_listener(Rc::clone(&listener)).unwrap();

    let program = Node::new("lambda").with_child(
        Node::with_value(
            "for-each",
            Node::new("list").with_children([Node::new("a"), Node::new("b"), Node::new("c")]),
        )
        .with_child(Node::new("tick")),
    );
    ctx.raise("lambda", &program).unwrap();
    assert_eq!(ticker.hits.get(), 3);

    let listed = ctx
        .raise("list-events", &Node::with_value("list-events", "tick"))
        .unwrap();
    assert_eq!(names(&listed), vec!["instance"]);

    ctx.unregister_listener(&listener);
    ctx.raise("lambda", &program).unwrap();
    assert_eq!(ticker.hits.get(), 3);
    assert!(ctx.instance_events().is_empty());
}

#[test]
fn test_return_from_loop_inside_try_runs_finally() {
    let mut ctx = context(&Arc::new(DynamicEvents::new()));
    let body = Node::new("lambda").with_children([
        Node::new("_cleanup"),
        Node::with_value("while", true).with_children([
            Node::new("try").with_child(Node::with_value("return", "early")),
            Node::new("finally").with_child(
                Node::with_value("add", selector("/../_cleanup"))
                    .with_child(Node::new("src").with_child(Node::new("done"))),
            ),
        ]),
        Node::with_value("throw", "unreached"),
    ]);
    let result = ctx.raise("lambda", &body).unwrap();
    assert_eq!(result.value(), Some(Value::from("early")));
    assert_eq!(names(&result.find("_cleanup").unwrap()), vec!["done"]);
}
