//! # ARBOR: Tree-Shaped Code Over Dynamic Dispatch
//!
//! ARBOR executes programs written as trees. Every node is named, may carry a
//! value, and holds ordered children; the same structure carries code and data.
//! Executing a node means raising its name as an event and letting whichever
//! handlers answer to that name mutate the tree.
//!
//! ## Building Blocks
//!
//! ### 1. The Tree
//! - Nodes, values and snapshots ([`tree`])
//! - Selector expressions for addressing nodes relative to each other ([`tree::Selector`])
//!
//! ### 2. Dispatch
//! - Named handlers, grouped into loadable units ([`event::HandlerUnit`], [`event::Loader`])
//! - A per-session dispatch core with overrides and listener instances ([`event::Context`])
//! - A process-wide store of script-declared events ([`event::DynamicEvents`])
//!
//! ### 3. Keywords
//! Control flow is not built into the dispatcher; it is a set of ordinary
//! handlers ([`eval`]):
//! - Statement execution: `lambda`, `eval`, `return`, `break`, `continue`
//! - Data: `set`, `add`
//! - Conditions: `if`, `else-if`, `else`, comparison and logical operators
//! - Loops: `while`, `for-each`
//! - Exceptions: `try`, `catch`, `finally`, `throw`
//! - Selection: `switch`, `case`, `default`
//! - Dynamic events: `event`, `remove-event`, `override`, `remove-override`,
//!   `call-base`, `list-events`
//!
//! ## Raising an Event
//!
//! ```text
//! Context::raise(name, tree)
//!   → overrides of `name`, resolved recursively
//!   → static handlers → instance handlers → catch-all handlers
//!   → the mutated tree
//! ```
//!
//! Statements report how they finished through [`event::Flow`]; `break`,
//! `continue` and `return` travel outwards as ordinary return values until a
//! loop or an evaluation boundary consumes them.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod eval;
pub mod event;
pub mod tree;

// Re-exports
pub use config::RuntimeConfig;
pub use error::*;
pub use event::{Context, DynamicEvents, EventArgs, Flow, HandlerUnit, Loader};
pub use tree::{Node, NodeSnapshot, Selector, Value};

/// A loader with every built-in keyword unit loaded.
pub fn core_loader(dynamic: Arc<DynamicEvents>, config: RuntimeConfig) -> InternalResult<Loader> {
    let loader = Loader::new(dynamic, config);
    for unit in eval::units() {
        let report = loader.load_unit(unit)?;
        if !report.rejected.is_empty() {
            return Err(Error::internal(format!(
                "core unit [{}] rejected {} handlers",
                report.unit,
                report.rejected.len()
            )));
        }
    }
    Ok(loader)
}
