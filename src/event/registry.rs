use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use dashmap::DashMap;
use tracing::{info, warn};

use super::{Context, DynamicEvents, EventArgs, Flow, OverrideGraph, CATCH_ALL};
use crate::{config::RuntimeConfig, Error, InternalResult, LambdaError, LambdaResult};

pub type StaticHandler = fn(&mut Context, &EventArgs) -> LambdaResult<Flow>;

/// Handler bound to a listener type, erased over the instance.
pub type InstanceHandler =
    Arc<dyn Fn(&dyn Any, &mut Context, &EventArgs) -> LambdaResult<Flow> + Send + Sync>;

/// A component whose handlers are registered per instance on a [`Context`].
pub trait Listener: Any {
    fn as_any(&self) -> &dyn Any;

    /// Next level of the type chain. Its handlers are registered too.
    fn base(&self) -> Option<&dyn Listener> {
        None
    }
}

/// Event name a handler answers to and, optionally, the event it overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub event: String,
    pub overrides: Option<String>,
}

impl Marker {
    fn validate(&self, catch_all: bool) -> LambdaResult<()> {
        if self.event.is_empty() && !catch_all {
            return Err(LambdaError::discovery("handler marker names no event"));
        }
        if self.event.starts_with('_') {
            return Err(LambdaError::discovery(format!(
                "[{}] is reserved for data segments",
                self.event
            )));
        }
        match &self.overrides {
            Some(base) if catch_all => Err(LambdaError::discovery(format!(
                "a catch-all handler cannot override [{}]",
                base
            ))),
            Some(base) if base.is_empty() || *base == self.event => {
                Err(LambdaError::discovery(format!(
                    "[{}] cannot override [{}]",
                    self.event, base
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
struct StagedStatic {
    marker: Marker,
    catch_all: bool,
    handler: StaticHandler,
}

#[derive(Clone)]
struct StagedInstance {
    id: usize,
    type_id: TypeId,
    type_name: &'static str,
    marker: Marker,
    catch_all: bool,
    handler: InstanceHandler,
}

/// A named group of handlers, loaded and unloaded together.
#[derive(Clone)]
pub struct HandlerUnit {
    name: String,
    statics: Vec<StagedStatic>,
    instances: Vec<StagedInstance>,
}

impl HandlerUnit {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            statics: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on(self, event: &str, handler: StaticHandler) -> Self {
        self.stage_static(event, None, false, handler)
    }

    pub fn on_override(self, event: &str, base: &str, handler: StaticHandler) -> Self {
        self.stage_static(event, Some(base), false, handler)
    }

    /// Invoked after the named handlers of every raised event.
    pub fn on_any(self, handler: StaticHandler) -> Self {
        self.stage_static(CATCH_ALL, None, true, handler)
    }

    pub fn listener<T: Listener>(
        self,
        event: &str,
        handler: fn(&T, &mut Context, &EventArgs) -> LambdaResult<Flow>,
    ) -> Self {
        self.stage_instance(event, None, false, handler)
    }

    pub fn listener_override<T: Listener>(
        self,
        event: &str,
        base: &str,
        handler: fn(&T, &mut Context, &EventArgs) -> LambdaResult<Flow>,
    ) -> Self {
        self.stage_instance(event, Some(base), false, handler)
    }

    pub fn listener_any<T: Listener>(
        self,
        handler: fn(&T, &mut Context, &EventArgs) -> LambdaResult<Flow>,
    ) -> Self {
        self.stage_instance(CATCH_ALL, None, true, handler)
    }

    fn stage_static(
        mut self,
        event: &str,
        base: Option<&str>,
        catch_all: bool,
        handler: StaticHandler,
    ) -> Self {
        self.statics.push(StagedStatic {
            marker: Marker {
                event: event.to_string(),
                overrides: base.map(str::to_string),
            },
            catch_all,
            handler,
        });
        self
    }

    fn stage_instance<T: Listener>(
        mut self,
        event: &str,
        base: Option<&str>,
        catch_all: bool,
        handler: fn(&T, &mut Context, &EventArgs) -> LambdaResult<Flow>,
    ) -> Self {
        let type_name = std::any::type_name::<T>();
        let erased: InstanceHandler = Arc::new(
            move |instance: &dyn Any, ctx: &mut Context, e: &EventArgs| match instance
                .downcast_ref::<T>()
            {
                Some(typed) => handler(typed, ctx, e),
                None => Err(LambdaError::discovery(format!(
                    "[{}] bound to an instance that is not {}",
                    e.name(),
                    type_name
                ))),
            },
        );
        self.instances.push(StagedInstance {
            id: next_handler_id(),
            type_id: TypeId::of::<T>(),
            type_name,
            marker: Marker {
                event: event.to_string(),
                overrides: base.map(str::to_string),
            },
            catch_all,
            handler: erased,
        });
        self
    }
}

#[derive(Clone)]
pub(crate) struct InstanceEntry {
    pub(crate) id: usize,
    pub(crate) marker: Marker,
    pub(crate) handler: InstanceHandler,
}

/// Startup-built lookup tables shared read-only by every [`Context`].
#[derive(Default)]
pub struct HandlerTable {
    statics: HashMap<String, Vec<StaticHandler>>,
    static_overrides: Vec<(String, String)>,
    instances: HashMap<TypeId, Vec<InstanceEntry>>,
}

impl HandlerTable {
    fn build(units: &[Arc<HandlerUnit>]) -> Self {
        let mut table = HandlerTable::default();
        for unit in units {
            for entry in &unit.statics {
                table
                    .statics
                    .entry(entry.marker.event.clone())
                    .or_default()
                    .push(entry.handler);
                if let Some(base) = &entry.marker.overrides {
                    table
                        .static_overrides
                        .push((base.clone(), entry.marker.event.clone()));
                }
            }
            for entry in &unit.instances {
                table
                    .instances
                    .entry(entry.type_id)
                    .or_default()
                    .push(InstanceEntry {
                        id: entry.id,
                        marker: entry.marker.clone(),
                        handler: Arc::clone(&entry.handler),
                    });
            }
        }
        table
    }

    pub fn statics(&self, event: &str) -> &[StaticHandler] {
        self.statics.get(event).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn static_overrides(&self) -> &[(String, String)] {
        &self.static_overrides
    }

    pub(crate) fn instance_entries(&self, type_id: TypeId) -> &[InstanceEntry] {
        self.instances
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn static_events(&self) -> impl Iterator<Item = &str> {
        self.statics.keys().map(String::as_str)
    }
}

fn next_handler_id() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub unit: String,
    pub accepted: usize,
    pub rejected: Vec<LambdaError>,
}

/// Holds the loaded units and the table built from them.
pub struct Loader {
    units: DashMap<String, (u64, Arc<HandlerUnit>)>,
    sequence: AtomicU64,
    table: RwLock<Arc<HandlerTable>>,
    dynamic: Arc<DynamicEvents>,
    config: RuntimeConfig,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(DynamicEvents::shared(), RuntimeConfig::default())
    }
}

impl Loader {
    pub fn new(dynamic: Arc<DynamicEvents>, config: RuntimeConfig) -> Self {
        Self {
            units: DashMap::new(),
            sequence: AtomicU64::new(0),
            table: RwLock::new(Arc::new(HandlerTable::default())),
            dynamic,
            config,
        }
    }

    /// Validates and loads a unit, replacing any unit of the same name.
    /// Invalid entries are dropped and reported; the rest load.
    pub fn load_unit(&self, unit: HandlerUnit) -> InternalResult<LoadReport> {
        let mut rejected = Vec::new();
        let mut accepted = HandlerUnit::new(unit.name.clone());
        let mut graph = self.static_overrides_without(&unit.name);
        for entry in unit.statics {
            let checked = entry.marker.validate(entry.catch_all).and_then(|()| {
                match &entry.marker.overrides {
                    Some(base) => graph
                        .add(base, &entry.marker.event)
                        .map_err(|e| LambdaError::discovery(e.message())),
                    None => Ok(()),
                }
            });
            match checked {
                Ok(()) => accepted.statics.push(entry),
                Err(e) => {
                    warn!("unit [{}] rejected handler: {}", unit.name, e);
                    rejected.push(e);
                }
            }
        }
        for entry in unit.instances {
            match entry.marker.validate(entry.catch_all) {
                Ok(()) => accepted.instances.push(entry),
                Err(e) => {
                    warn!(
                        "unit [{}] rejected handler of {}: {}",
                        unit.name, entry.type_name, e
                    );
                    rejected.push(e);
                }
            }
        }
        let report = LoadReport {
            unit: accepted.name.clone(),
            accepted: accepted.statics.len() + accepted.instances.len(),
            rejected,
        };
        let order = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.units
            .insert(accepted.name.clone(), (order, Arc::new(accepted)));
        self.rebuild()?;
        info!(
            "loaded unit [{}]: {} handlers, {} rejected",
            report.unit,
            report.accepted,
            report.rejected.len()
        );
        Ok(report)
    }

    /// Override edges of every loaded unit except `name`.
    fn static_overrides_without(&self, name: &str) -> OverrideGraph {
        let mut graph = OverrideGraph::new();
        for entry in self.units.iter().filter(|entry| entry.key() != name) {
            for staged in &entry.value().1.statics {
                if let Some(base) = &staged.marker.overrides {
                    if let Err(e) = graph.add(base, &staged.marker.event) {
                        warn!("loaded unit [{}] holds a cyclic override: {}", entry.key(), e);
                    }
                }
            }
        }
        graph
    }

    pub fn unload_unit(&self, name: &str) -> InternalResult<bool> {
        let removed = self.units.remove(name).is_some();
        if removed {
            self.rebuild()?;
            info!("unloaded unit [{}]", name);
        }
        Ok(removed)
    }

    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<(u64, String)> = self
            .units
            .iter()
            .map(|entry| (entry.value().0, entry.key().clone()))
            .collect();
        units.sort();
        units.into_iter().map(|(_, name)| name).collect()
    }

    pub fn table(&self) -> InternalResult<Arc<HandlerTable>> {
        let table = self
            .table
            .read()
            .map_err(|e| Error::internal(format!("handler table lock poisoned: {}", e)))?;
        Ok(Arc::clone(&table))
    }

    pub fn dynamic(&self) -> &Arc<DynamicEvents> {
        &self.dynamic
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A fresh context over the current table.
    pub fn context(&self) -> InternalResult<Context> {
        Ok(Context::new(
            self.table()?,
            Arc::clone(&self.dynamic),
            self.config.clone(),
        )?)
    }

    fn rebuild(&self) -> InternalResult<()> {
        let mut units: Vec<(u64, Arc<HandlerUnit>)> = self
            .units
            .iter()
            .map(|entry| (entry.value().0, Arc::clone(&entry.value().1)))
            .collect();
        units.sort_by_key(|(order, _)| *order);
        let units: Vec<Arc<HandlerUnit>> = units.into_iter().map(|(_, unit)| unit).collect();
        let table = Arc::new(HandlerTable::build(&units));
        let mut current = self
            .table
            .write()
            .map_err(|e| Error::internal(format!("handler table lock poisoned: {}", e)))?;
        *current = table;
        Ok(())
    }
}
