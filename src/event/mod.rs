//! Named, overridable event dispatch.

mod context;
mod dynamic;
mod overrides;
mod registry;

pub use context::Context;
pub(crate) use context::consume;
pub use dynamic::{DynamicEvents, LockObserver, MockLockObserver, StoreOperation};
pub use overrides::OverrideGraph;
pub use registry::{
    HandlerTable, HandlerUnit, InstanceHandler, Listener, LoadReport, Loader, Marker,
    StaticHandler,
};

use crate::tree::Node;

/// Key under which catch-all handlers are registered.
pub const CATCH_ALL: &str = "";

/// Raised once by every new [`Context`] so subsystems can seed it.
pub const INITIALIZE_CONTEXT: &str = "arbor.core.initialize-context";

/// Outcome of executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    ContinueLoop,
    /// Carries the returned value and children on a detached node.
    Return(Node),
}

impl Flow {
    pub fn is_normal(&self) -> bool {
        matches!(self, Flow::Normal)
    }
}

/// The raised name, its tree and, for override invocations, the raise it replaced.
#[derive(Debug, Clone)]
pub struct EventArgs {
    name: String,
    args: Node,
    base: Option<Box<EventArgs>>,
}

impl EventArgs {
    pub fn new<S: Into<String>>(name: S, args: Node) -> Self {
        Self {
            name: name.into(),
            args,
            base: None,
        }
    }

    fn derived(name: &str, base: &EventArgs) -> Self {
        Self {
            name: name.to_string(),
            args: base.args.clone(),
            base: Some(Box::new(base.clone())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Node {
        &self.args
    }

    pub fn base(&self) -> Option<&EventArgs> {
        self.base.as_deref()
    }
}
