use std::{
    cell::RefCell,
    cmp::Ordering,
    fmt,
    rc::{Rc, Weak},
};

use tracing::warn;

use super::value::{compare_values, Value};
use crate::{LambdaError, LambdaResult};

struct NodeData {
    name: String,
    value: Option<Value>,
    children: Vec<Node>,
    parent: Weak<RefCell<NodeData>>,
}

/// Handle to a named, valued, ordered tree node.
///
/// Cloning a `Node` copies the handle; both handles observe the same node.
/// [`Node::deep_clone`] produces an independent copy. Equality and ordering
/// are structural: name, then value, then child count, then children pairwise.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Node(Rc::new(RefCell::new(NodeData {
            name: name.into(),
            value: None,
            children: Vec::new(),
            parent: Weak::new(),
        })))
    }

    pub fn with_value<S: Into<String>, V: Into<Value>>(name: S, value: V) -> Self {
        let node = Node::new(name);
        node.set_value(value);
        node
    }

    /// Builder form of [`Node::add`]. A child that would create a cycle is skipped.
    pub fn with_child(self, child: Node) -> Self {
        if let Err(e) = self.add(child) {
            warn!("with_child skipped: {}", e);
        }
        self
    }

    pub fn with_children<I: IntoIterator<Item = Node>>(self, children: I) -> Self {
        children.into_iter().fold(self, Node::with_child)
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.0.borrow().name == name
    }

    pub fn set_name<S: Into<String>>(&self, name: S) {
        self.0.borrow_mut().name = name.into();
    }

    pub fn value(&self) -> Option<Value> {
        self.0.borrow().value.clone()
    }

    pub fn has_value(&self) -> bool {
        self.0.borrow().value.is_some()
    }

    pub fn set_value<V: Into<Value>>(&self, value: V) {
        self.0.borrow_mut().value = Some(value.into());
    }

    pub fn replace_value(&self, value: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.0.borrow_mut().value, value)
    }

    pub fn take_value(&self) -> Option<Value> {
        self.0.borrow_mut().value.take()
    }

    pub fn clear_value(&self) {
        self.0.borrow_mut().value = None;
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    pub fn root(&self) -> Node {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.borrow().children.get(index).cloned()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.child(0)
    }

    pub fn last_child(&self) -> Option<Node> {
        self.0.borrow().children.last().cloned()
    }

    pub fn find(&self, name: &str) -> Option<Node> {
        self.0
            .borrow()
            .children
            .iter()
            .find(|c| c.has_name(name))
            .cloned()
    }

    pub fn find_all(&self, name: &str) -> Vec<Node> {
        self.0
            .borrow()
            .children
            .iter()
            .filter(|c| c.has_name(name))
            .cloned()
            .collect()
    }

    /// Position within the parent, `None` for a root.
    pub fn index(&self) -> Option<usize> {
        let parent = self.parent()?;
        let position = parent.0.borrow().children.iter().position(|c| c.ptr_eq(self));
        position
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// True when `self` is a strict ancestor of `node`.
    pub fn is_ancestor_of(&self, node: &Node) -> bool {
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.ptr_eq(self) {
                return true;
            }
            current = parent.parent();
        }
        false
    }

    /// Appends `child`, detaching it from any prior parent first.
    pub fn add(&self, child: Node) -> LambdaResult<()> {
        self.attach(None, child)
    }

    /// Inserts `child` at `index`, detaching it from any prior parent first.
    /// The index refers to the child list after that detach.
    pub fn insert(&self, index: usize, child: Node) -> LambdaResult<()> {
        self.attach(Some(index), child)
    }

    pub fn add_child<S: Into<String>>(&self, name: S) -> Node {
        let child = Node::new(name);
        self.push_detached(child.clone());
        child
    }

    pub fn add_value_child<S: Into<String>, V: Into<Value>>(&self, name: S, value: V) -> Node {
        let child = Node::with_value(name, value);
        self.push_detached(child.clone());
        child
    }

    fn push_detached(&self, child: Node) {
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child);
    }

    fn attach(&self, index: Option<usize>, child: Node) -> LambdaResult<()> {
        if child.ptr_eq(self) || child.is_ancestor_of(self) {
            return Err(LambdaError::structural(format!(
                "cannot insert [{}] into its own subtree",
                child.name()
            )));
        }
        let already_here = child.parent().is_some_and(|p| p.ptr_eq(self));
        let available = self.count() - usize::from(already_here);
        let index = index.unwrap_or(available);
        if index > available {
            return Err(LambdaError::structural(format!(
                "insert position {} out of range for [{}] with {} children",
                index,
                self.name(),
                available
            )));
        }
        child.detach();
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.insert(index, child);
        Ok(())
    }

    fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.0.borrow_mut().children.retain(|c| !c.ptr_eq(self));
        }
        self.0.borrow_mut().parent = Weak::new();
    }

    /// Removes this node from its parent.
    pub fn untie(&self) -> LambdaResult<()> {
        if self.parent().is_none() {
            return Err(LambdaError::structural(format!(
                "cannot untie [{}], it has no parent",
                self.name()
            )));
        }
        self.detach();
        Ok(())
    }

    /// Puts `other` at this node's position and detaches this node.
    pub fn replace(&self, other: &Node) -> LambdaResult<()> {
        let parent = self.parent().ok_or_else(|| {
            LambdaError::structural(format!(
                "cannot replace [{}], it has no parent",
                self.name()
            ))
        })?;
        if other.ptr_eq(self) {
            return Ok(());
        }
        if other.is_ancestor_of(self) {
            return Err(LambdaError::structural(format!(
                "cannot replace [{}] with its own ancestor [{}]",
                self.name(),
                other.name()
            )));
        }
        other.detach();
        let index = self.index().ok_or_else(|| {
            LambdaError::structural(format!("[{}] lost its position", self.name()))
        })?;
        parent.0.borrow_mut().children[index] = other.clone();
        other.0.borrow_mut().parent = Rc::downgrade(&parent.0);
        self.0.borrow_mut().parent = Weak::new();
        Ok(())
    }

    /// Detaches every child.
    pub fn clear(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in children {
            child.0.borrow_mut().parent = Weak::new();
        }
    }

    pub fn deep_clone(&self) -> Node {
        let data = self.0.borrow();
        let copy = Node::new(data.name.clone());
        copy.0.borrow_mut().value = data.value.as_ref().map(Value::deep_clone);
        for child in &data.children {
            copy.push_detached(child.deep_clone());
        }
        copy
    }

    /// Structural order: name, value, child count, then children pairwise.
    pub fn compare(&self, other: &Node) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        let left = self.0.borrow();
        let right = other.0.borrow();
        left.name
            .cmp(&right.name)
            .then_with(|| compare_values(&left.value, &right.value))
            .then_with(|| left.children.len().cmp(&right.children.len()))
            .then_with(|| {
                left.children
                    .iter()
                    .zip(right.children.iter())
                    .map(|(l, r)| l.compare(r))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            })
    }

    pub fn previous_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = self.index()?;
        if index == 0 {
            return None;
        }
        parent.child(index - 1)
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        parent.child(self.index()? + 1)
    }

    /// Previous node in document order: the deepest last descendant of the
    /// previous sibling, or the parent. `None` for a root.
    pub fn previous_node(&self) -> Option<Node> {
        match self.previous_sibling() {
            Some(mut current) => {
                while let Some(last) = current.last_child() {
                    current = last;
                }
                Some(current)
            }
            None => self.parent(),
        }
    }

    /// Next node in document order. `None` for the last node of the tree.
    pub fn next_node(&self) -> Option<Node> {
        if let Some(first) = self.first_child() {
            return Some(first);
        }
        let mut current = self.clone();
        loop {
            if let Some(next) = current.next_sibling() {
                return Some(next);
            }
            current = current.parent()?;
        }
    }

    /// Every descendant in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Node> {
        let mut result = Vec::new();
        for child in self.children() {
            result.push(child.clone());
            result.extend(child.descendants());
        }
        result
    }

    /// Child indexes leading from the root to this node.
    pub fn path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = self.clone();
        while let Some(index) = current.index() {
            path.push(index);
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    pub fn node_at(&self, path: &[usize]) -> Option<Node> {
        path.iter()
            .try_fold(self.clone(), |current, index| current.child(*index))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = self.0.borrow();
        let mut s = f.debug_struct("Node");
        s.field("name", &data.name);
        if let Some(value) = &data.value {
            s.field("value", value);
        }
        if !data.children.is_empty() {
            s.field("children", &data.children);
        }
        s.finish()
    }
}
