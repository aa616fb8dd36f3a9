use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use lazy_static::lazy_static;
use tracing::debug;

use super::OverrideGraph;
use crate::{tree::NodeSnapshot, LambdaResult};

/// Store operations that take the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StoreOperation {
    Declare,
    Remove,
    Lookup,
    Names,
    AddOverride,
    RemoveOverride,
    Overrides,
}

/// Notified every time the store lock is acquired.
#[mockall::automock]
pub trait LockObserver: Send + Sync {
    fn acquired(&self, operation: StoreOperation);
}

#[derive(Default)]
struct StoreInner {
    events: HashMap<String, Vec<NodeSnapshot>>,
    overrides: Vec<(String, String)>,
}

/// Process-wide store of script-declared events and overrides.
///
/// Every access goes through one mutex. [`DynamicEvents::bodies`] is hit for
/// every raise in the system, so it first consults a lock-free bitmask over
/// the hashes of declared names and only locks when the name may be present.
pub struct DynamicEvents {
    inner: Mutex<StoreInner>,
    probe: AtomicU64,
    observer: Option<Box<dyn LockObserver>>,
}

lazy_static! {
    static ref SHARED: Arc<DynamicEvents> = Arc::new(DynamicEvents::new());
}

impl Default for DynamicEvents {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_bit(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    1u64 << (hasher.finish() % 64)
}

impl DynamicEvents {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            probe: AtomicU64::new(0),
            observer: None,
        }
    }

    pub fn with_observer<O: LockObserver + 'static>(observer: O) -> Self {
        Self {
            observer: Some(Box::new(observer)),
            ..Self::new()
        }
    }

    /// The default process-wide instance.
    pub fn shared() -> Arc<DynamicEvents> {
        Arc::clone(&SHARED)
    }

    fn lock(&self, operation: StoreOperation) -> MutexGuard<'_, StoreInner> {
        // Mutations never leave the maps half-updated, so a poisoned lock is still usable.
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(observer) = &self.observer {
            observer.acquired(operation);
        }
        guard
    }

    /// Appends bodies under `name`.
    pub fn declare(&self, name: &str, bodies: Vec<NodeSnapshot>) {
        let mut inner = self.lock(StoreOperation::Declare);
        let count = bodies.len();
        inner
            .events
            .entry(name.to_string())
            .or_default()
            .extend(bodies);
        self.probe.fetch_or(probe_bit(name), Ordering::Release);
        debug!("declared [{}] with {} more bodies", name, count);
    }

    /// Deletes every body under `name`.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.lock(StoreOperation::Remove);
        let removed = inner.events.remove(name).is_some();
        if removed {
            let mask = inner.events.keys().fold(0, |mask, n| mask | probe_bit(n));
            self.probe.store(mask, Ordering::Release);
            debug!("removed dynamic event [{}]", name);
        }
        removed
    }

    /// Lock-free check; false means `name` is certainly not declared.
    pub fn may_contain(&self, name: &str) -> bool {
        let bit = probe_bit(name);
        self.probe.load(Ordering::Acquire) & bit == bit
    }

    pub fn bodies(&self, name: &str) -> Option<Vec<NodeSnapshot>> {
        if !self.may_contain(name) {
            return None;
        }
        let inner = self.lock(StoreOperation::Lookup);
        inner.events.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self.lock(StoreOperation::Names);
        let mut names: Vec<String> = inner.events.keys().cloned().collect();
        names.sort();
        names
    }

    /// Records `base -> sup` unless it closes a cycle with the stored overrides.
    pub fn add_override(&self, base: &str, sup: &str) -> LambdaResult<()> {
        let mut inner = self.lock(StoreOperation::AddOverride);
        let mut graph = OverrideGraph::new();
        for (b, s) in &inner.overrides {
            graph.add(b, s)?;
        }
        graph.add(base, sup)?;
        inner.overrides.push((base.to_string(), sup.to_string()));
        Ok(())
    }

    pub fn remove_override(&self, base: &str, sup: &str) -> bool {
        let mut inner = self.lock(StoreOperation::RemoveOverride);
        match inner
            .overrides
            .iter()
            .rposition(|(b, s)| b == base && s == sup)
        {
            Some(position) => {
                inner.overrides.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn overrides(&self) -> Vec<(String, String)> {
        let inner = self.lock(StoreOperation::Overrides);
        inner.overrides.clone()
    }
}
