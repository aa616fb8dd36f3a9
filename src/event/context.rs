use std::{collections::HashMap, rc::Rc, sync::Arc};

use tracing::{debug, trace};

use super::{
    registry::{HandlerTable, InstanceHandler, Listener},
    DynamicEvents, EventArgs, Flow, OverrideGraph, CATCH_ALL, INITIALIZE_CONTEXT,
};
use crate::{config::RuntimeConfig, tree::Node, LambdaError, LambdaResult};

#[derive(Clone)]
struct Binding {
    owner: Rc<dyn Listener>,
    level: usize,
    id: usize,
    handler: InstanceHandler,
}

fn same_instance(a: &Rc<dyn Listener>, b: &Rc<dyn Listener>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

fn level_of(owner: &Rc<dyn Listener>, level: usize) -> Option<&dyn Listener> {
    let mut current: &dyn Listener = owner.as_ref();
    for _ in 0..level {
        current = current.base()?;
    }
    Some(current)
}

/// Per-session dispatch core.
///
/// Owns the resolved override map and instance bindings; the static table and
/// the dynamic event store are shared. Not `Send`: a context stays on the
/// thread that built it.
pub struct Context {
    table: Arc<HandlerTable>,
    instances: HashMap<String, Vec<Binding>>,
    overrides: OverrideGraph,
    installed: Vec<(Rc<dyn Listener>, String, String)>,
    dynamic: Arc<DynamicEvents>,
    config: RuntimeConfig,
    depth: usize,
    bases: Vec<Option<EventArgs>>,
}

impl Context {
    /// Installs the table's override markers, then raises the initialization event.
    pub fn new(
        table: Arc<HandlerTable>,
        dynamic: Arc<DynamicEvents>,
        config: RuntimeConfig,
    ) -> LambdaResult<Self> {
        let mut overrides = OverrideGraph::new();
        for (base, sup) in table.static_overrides() {
            overrides.add(base, sup)?;
        }
        let mut ctx = Self {
            table,
            instances: HashMap::new(),
            overrides,
            installed: Vec::new(),
            dynamic,
            config,
            depth: 0,
            bases: Vec::new(),
        };
        ctx.raise(INITIALIZE_CONTEXT, &Node::new(INITIALIZE_CONTEXT))?;
        Ok(ctx)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dynamic(&self) -> &Arc<DynamicEvents> {
        &self.dynamic
    }

    pub fn overrides(&self) -> &OverrideGraph {
        &self.overrides
    }

    /// Raises `name` as an outer boundary. A returned value lands on `args`;
    /// a `break` or `continue` reaching here is a structural error.
    pub fn raise(&mut self, name: &str, args: &Node) -> LambdaResult<Node> {
        let flow = self.raise_flow(name, args)?;
        consume(args, flow)?;
        Ok(args.clone())
    }

    /// Raises `name`, resolving overrides, and hands the flow back to the caller.
    pub fn raise_flow(&mut self, name: &str, args: &Node) -> LambdaResult<Flow> {
        self.dispatch(&EventArgs::new(name, args.clone()))
    }

    /// Raises without resolving overrides.
    pub fn raise_direct(&mut self, e: &EventArgs) -> LambdaResult<Flow> {
        self.enter(e.name())?;
        let result = self.invoke(e);
        self.depth -= 1;
        result.map_err(|err| err.traced(e.name()))
    }

    /// Invokes the event `e` replaced, if it was raised through an override.
    pub fn call_base(&mut self, e: &EventArgs) -> LambdaResult<Flow> {
        match e.base() {
            Some(base) => self.raise_direct(base),
            None => Ok(Flow::Normal),
        }
    }

    fn dispatch(&mut self, e: &EventArgs) -> LambdaResult<Flow> {
        self.enter(e.name())?;
        let result = match self.overrides.supers(e.name()).map(<[String]>::to_vec) {
            Some(supers) => self.dispatch_supers(e, &supers),
            None => self.invoke(e),
        };
        self.depth -= 1;
        result.map_err(|err| err.traced(e.name()))
    }

    fn dispatch_supers(&mut self, e: &EventArgs, supers: &[String]) -> LambdaResult<Flow> {
        for sup in supers {
            let flow = self.dispatch(&EventArgs::derived(sup, e))?;
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn enter(&mut self, name: &str) -> LambdaResult<()> {
        if self.depth >= self.config.max_depth {
            return Err(LambdaError::exhausted(format!(
                "raising [{}] exceeded the nesting limit of {}",
                name, self.config.max_depth
            )));
        }
        self.depth += 1;
        if self.config.trace_raises {
            trace!(depth = self.depth, "raise [{}]", name);
        }
        Ok(())
    }

    fn invoke(&mut self, e: &EventArgs) -> LambdaResult<Flow> {
        let keys = if e.name() == CATCH_ALL {
            vec![CATCH_ALL]
        } else {
            vec![e.name(), CATCH_ALL]
        };
        let table = Arc::clone(&self.table);
        for key in keys {
            for handler in table.statics(key) {
                let flow = handler(self, e)?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
            }
            let bindings = self.instances.get(key).cloned().unwrap_or_default();
            for binding in bindings {
                let Some(instance) = level_of(&binding.owner, binding.level) else {
                    continue;
                };
                let flow = (binding.handler)(instance.as_any(), self, e)?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
            }
        }
        Ok(Flow::Normal)
    }

    /// Appends `sup` to the overrides of `base`.
    pub fn override_event(&mut self, base: &str, sup: &str) -> LambdaResult<()> {
        self.overrides.add(base, sup)
    }

    pub fn remove_override(&mut self, base: &str, sup: &str) -> bool {
        self.overrides.remove(base, sup)
    }

    /// Binds the handlers of the listener's type chain to this instance.
    /// Registering the same instance again adds nothing. If any override the
    /// chain installs would close a cycle, nothing is registered.
    pub fn register_listener(&mut self, listener: Rc<dyn Listener>) -> LambdaResult<()> {
        let table = Arc::clone(&self.table);
        let mut overrides = self.overrides.clone();
        let mut installed = Vec::new();
        let mut staged: Vec<(String, Binding)> = Vec::new();
        let mut level = 0;
        let mut current: Option<&dyn Listener> = Some(listener.as_ref());
        while let Some(object) = current {
            for entry in table.instance_entries(object.as_any().type_id()) {
                let bound = self.instances.get(&entry.marker.event).is_some_and(|slot| {
                    slot.iter()
                        .any(|b| b.id == entry.id && same_instance(&b.owner, &listener))
                }) || staged.iter().any(|(_, b)| b.id == entry.id);
                if bound {
                    continue;
                }
                if let Some(base) = &entry.marker.overrides {
                    overrides.add(base, &entry.marker.event)?;
                    installed.push((
                        Rc::clone(&listener),
                        base.clone(),
                        entry.marker.event.clone(),
                    ));
                }
                staged.push((
                    entry.marker.event.clone(),
                    Binding {
                        owner: Rc::clone(&listener),
                        level,
                        id: entry.id,
                        handler: Arc::clone(&entry.handler),
                    },
                ));
            }
            current = object.base();
            level += 1;
        }

        self.overrides = overrides;
        self.installed.extend(installed);
        for (event, binding) in staged {
            debug!("bound [{}] at type level {}", event, binding.level);
            self.instances.entry(event).or_default().push(binding);
        }
        Ok(())
    }

    /// Removes this instance's bindings and the overrides it installed.
    pub fn unregister_listener(&mut self, listener: &Rc<dyn Listener>) {
        for slot in self.instances.values_mut() {
            slot.retain(|b| !same_instance(&b.owner, listener));
        }
        self.instances.retain(|_, slot| !slot.is_empty());

        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.installed)
            .into_iter()
            .partition(|(owner, _, _)| same_instance(owner, listener));
        self.installed = others;
        for (_, base, sup) in mine {
            self.overrides.remove(&base, &sup);
        }
    }

    /// Names with a static handler, sorted.
    pub fn static_events(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .static_events()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    /// Names with a handler bound to a registered listener, sorted.
    pub fn instance_events(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .keys()
            .filter(|n| !n.is_empty())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Every event name with a static, instance or dynamic handler, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .static_events()
            .map(str::to_string)
            .chain(self.instances.keys().cloned())
            .chain(self.dynamic.names())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub(crate) fn push_base(&mut self, base: Option<EventArgs>) {
        self.bases.push(base);
    }

    pub(crate) fn pop_base(&mut self) {
        self.bases.pop();
    }

    /// Base of the innermost dynamic event being executed.
    pub fn current_base(&self) -> Option<EventArgs> {
        self.bases.last().cloned().flatten()
    }
}

/// Applies a flow that reached an evaluation boundary to `args`.
pub(crate) fn consume(args: &Node, flow: Flow) -> LambdaResult<()> {
    match flow {
        Flow::Normal => Ok(()),
        Flow::Return(returned) => {
            if let Some(value) = returned.take_value() {
                args.set_value(value);
            }
            for child in returned.children() {
                args.add(child)?;
            }
            Ok(())
        }
        Flow::Break => Err(LambdaError::structural(format!(
            "[break] reached [{}] outside of any loop",
            args.name()
        ))),
        Flow::ContinueLoop => Err(LambdaError::structural(format!(
            "[continue] reached [{}] outside of any loop",
            args.name()
        ))),
    }
}
