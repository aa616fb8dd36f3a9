//! The tree type used for both code and data.

mod node;
mod selector;
mod snapshot;
mod value;

pub use node::Node;
pub use selector::{MatchKind, Selector, SelectorMatch, Step};
pub use snapshot::{NodeSnapshot, SnapshotValue};
pub use value::{compare_values, is_truthy, Value};
