use std::cmp::Ordering;

use arbor::{Node, Value};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Shape {
    name: String,
    value: Option<i64>,
    children: Vec<Shape>,
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = ("[ab_]{1,3}", proptest::option::of(-3i64..3)).prop_map(|(name, value)| Shape {
        name,
        value,
        children: Vec::new(),
    });
    leaf.prop_recursive(3, 32, 4, |inner| {
        (
            "[ab_]{1,3}",
            proptest::option::of(-3i64..3),
            proptest::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, value, children)| Shape {
                name,
                value,
                children,
            })
    })
}

fn build(shape: &Shape) -> Node {
    let node = Node::new(shape.name.clone());
    if let Some(value) = shape.value {
        node.set_value(value);
    }
    node.with_children(shape.children.iter().map(build))
}

fn parent_links_hold(node: &Node) -> bool {
    node.children().iter().all(|child| {
        child.parent().is_some_and(|p| p.ptr_eq(node)) && parent_links_hold(child)
    })
}

proptest! {
    #[test]
    fn clone_is_equal_and_independent(shape in shape()) {
        let original = build(&shape);
        let before = original.snapshot();
        let copy = original.deep_clone();

        prop_assert_eq!(&copy, &original);
        prop_assert!(!copy.ptr_eq(&original));
        prop_assert!(copy.parent().is_none());
        prop_assert!(parent_links_hold(&copy));

        copy.set_name("renamed");
        copy.add_child("extra");
        for descendant in copy.descendants() {
            descendant.set_value(Value::from("changed"));
        }
        prop_assert_eq!(original.snapshot(), before);
    }

    #[test]
    fn compare_is_reflexive_and_antisymmetric(left in shape(), right in shape()) {
        let left = build(&left);
        let right = build(&right);
        prop_assert_eq!(left.compare(&left.deep_clone()), Ordering::Equal);
        prop_assert_eq!(left.compare(&right), right.compare(&left).reverse());
    }

    #[test]
    fn untie_and_reparent_keep_order(shape in shape(), pick in any::<prop::sample::Index>()) {
        let root = build(&shape);
        prop_assume!(root.count() > 0);
        let names: Vec<String> = root.children().iter().map(Node::name).collect();
        let index = pick.index(root.count());
        let child = root.child(index).unwrap();

        child.untie().unwrap();
        prop_assert!(child.parent().is_none());
        let mut expected = names.clone();
        expected.remove(index);
        let remaining: Vec<String> = root.children().iter().map(Node::name).collect();
        prop_assert_eq!(remaining, expected);

        let holder = Node::new("holder");
        holder.add(child.clone()).unwrap();
        prop_assert!(child.parent().is_some_and(|p| p.ptr_eq(&holder)));
        prop_assert_eq!(child.index(), Some(0));

        root.insert(index, child.clone()).unwrap();
        prop_assert_eq!(holder.count(), 0);
        let restored: Vec<String> = root.children().iter().map(Node::name).collect();
        prop_assert_eq!(restored, names);
        prop_assert!(parent_links_hold(&root));
    }
}
