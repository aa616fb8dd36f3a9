use std::{sync::Arc, thread};

use arbor::{DynamicEvents, Node};
use pretty_assertions::assert_eq;

use super::context;

const THREADS: usize = 8;

fn declaration(name: &str, value: i64) -> Node {
    Node::with_value("event", name)
        .with_child(Node::new("lambda").with_child(Node::with_value("return", value)))
}

#[test]
fn test_concurrent_declarations_all_land() {
    let dynamic = Arc::new(DynamicEvents::new());
    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let dynamic = Arc::clone(&dynamic);
            thread::spawn(move || {
                let mut ctx = context(&dynamic);
                let own = format!("own-{}", i);
                ctx.raise("event", &declaration(&own, i as i64)).unwrap();
                ctx.raise("event", &declaration("common", i as i64)).unwrap();
                let result = ctx.raise(&own, &Node::new(own.as_str())).unwrap();
                result.value().and_then(|v| v.as_int())
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        let value = worker.join().unwrap();
        assert_eq!(value, Some(i as i64));
    }
    assert_eq!(dynamic.bodies("common").unwrap().len(), THREADS);
    assert_eq!(dynamic.names().len(), THREADS + 1);
}

#[test]
fn test_removal_races_with_invocation() {
    let dynamic = Arc::new(DynamicEvents::new());
    context(&dynamic)
        .raise("event", &declaration("flaky", 1))
        .unwrap();

    let invoker = {
        let dynamic = Arc::clone(&dynamic);
        thread::spawn(move || {
            let mut ctx = context(&dynamic);
            (0..200)
                .map(|_| {
                    let result = ctx.raise("flaky", &Node::new("flaky")).unwrap();
                    result.value().and_then(|v| v.as_int())
                })
                .collect::<Vec<_>>()
        })
    };
    let remover = {
        let dynamic = Arc::clone(&dynamic);
        thread::spawn(move || {
            let mut ctx = context(&dynamic);
            ctx.raise("remove-event", &Node::with_value("remove-event", "flaky"))
                .unwrap();
        })
    };

    remover.join().unwrap();
    // each raise sees either the whole event or none of it
    for value in invoker.join().unwrap() {
        assert!(value.is_none() || value == Some(1));
    }
    assert!(dynamic.bodies("flaky").is_none());
}

#[test]
fn test_overrides_visible_to_later_contexts_on_other_threads() {
    let dynamic = Arc::new(DynamicEvents::new());
    let mut ctx = context(&dynamic);
    ctx.raise("event", &declaration("base", 1)).unwrap();
    ctx.raise("event", &declaration("replacement", 2)).unwrap();
    ctx.raise(
        "override",
        &Node::with_value("override", "base").with_child(Node::with_value("super", "replacement")),
    )
    .unwrap();

    let seen = {
        let dynamic = Arc::clone(&dynamic);
        thread::spawn(move || {
            let mut ctx = context(&dynamic);
            let result = ctx.raise("base", &Node::new("base")).unwrap();
            result.value().and_then(|v| v.as_int())
        })
        .join()
        .unwrap()
    };
    assert_eq!(seen, Some(2));
}
