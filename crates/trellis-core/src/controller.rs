//! Controllers: stateful components that render a subtree.
//!
//! A controller owns a model, renders a [`Rendered`] description of its
//! content and is reconciled against its previous output whenever it is
//! marked dirty. Controllers nested in a rendered tree are owned by the
//! controller that rendered them; ids assigned with `.id(...)` are
//! registered in that owner's namespace.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_task::ArcWake;
use slotmap::new_key_type;

use crate::collections::map::HashMap;
use crate::error::ReconcileError;
use crate::fingerprint::Fingerprint;
use crate::platform::RuntimeScheduler;
use crate::reconciler::Reconciler;
use crate::runtime::RuntimeHandle;
use crate::value::Value;
use crate::view::{AsAny, ViewId, ViewTree};
use crate::vnode::{ControllerType, Rendered, VNode};

new_key_type! {
    pub struct ControllerId;
}

/// Events fired on a controller over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Load,
    Mounted,
    Update,
    Remove,
    Removed,
}

impl Lifecycle {
    /// Property name that routes this event to a named handler.
    pub fn property_name(&self) -> &'static str {
        match self {
            Lifecycle::Load => "onLoad",
            Lifecycle::Mounted => "onMounted",
            Lifecycle::Update => "onUpdate",
            Lifecycle::Remove => "onRemove",
            Lifecycle::Removed => "onRemoved",
        }
    }

    pub fn from_property(name: &str) -> Option<Self> {
        match name {
            "onLoad" => Some(Lifecycle::Load),
            "onMounted" => Some(Lifecycle::Mounted),
            "onUpdate" => Some(Lifecycle::Update),
            "onRemove" => Some(Lifecycle::Remove),
            "onRemoved" => Some(Lifecycle::Removed),
            _ => None,
        }
    }
}

pub type LoadError = Box<dyn std::error::Error>;

pub type LoadFuture = Pin<Box<dyn Future<Output = Result<(), LoadError>>>>;

/// Result of [`Controller::load`].
pub enum Load {
    Ready,
    Pending(LoadFuture),
}

impl Load {
    pub fn pending(future: impl Future<Output = Result<(), LoadError>> + 'static) -> Self {
        Load::Pending(Box::pin(future))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DataKey {
    Prop(String),
    Model(String),
}

pub type Model = HashMap<String, Value>;

/// Per-controller data tracked by the reconciler: the model plus the last
/// seen fingerprint of every property and model key.
#[derive(Debug, Default)]
pub struct ControllerData {
    model: Model,
    data_hash: HashMap<DataKey, Fingerprint>,
}

impl ControllerData {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.model.get(key)
    }

    fn changed(&self, key: &DataKey, fingerprint: Fingerprint) -> bool {
        self.data_hash.get(key) != Some(&fingerprint)
    }

    fn observe(&mut self, key: DataKey, fingerprint: Fingerprint) {
        self.data_hash.insert(key, fingerprint);
    }

    /// Returns whether the stored value changed.
    fn set_model(&mut self, key: &str, value: Value) -> bool {
        let data_key = DataKey::Model(key.to_owned());
        let fingerprint = value.fingerprint();
        if !self.changed(&data_key, fingerprint) {
            return false;
        }
        self.observe(data_key, fingerprint);
        self.model.insert(key.to_owned(), value);
        true
    }
}

/// Mutable access to a controller's surroundings during lifecycle hooks.
pub struct Scope<'a> {
    id: ControllerId,
    owner: Option<ControllerId>,
    data: &'a mut ControllerData,
    runtime: &'a RuntimeHandle,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        id: ControllerId,
        owner: Option<ControllerId>,
        data: &'a mut ControllerData,
        runtime: &'a RuntimeHandle,
    ) -> Self {
        Self {
            id,
            owner,
            data,
            runtime,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn owner(&self) -> Option<ControllerId> {
        self.owner
    }

    pub fn model(&self) -> &Model {
        self.data.model()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Store a model value, scheduling a re-render if its fingerprint
    /// changed.
    pub fn set_model(&mut self, key: &str, value: impl Into<Value>) {
        if self.data.set_model(key, value.into()) {
            self.runtime.mark_dirty(self.id);
        }
    }

    pub fn mark_dirty(&self) {
        self.runtime.mark_dirty(self.id);
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        self.runtime
    }
}

/// Read-only view handed to [`Controller::render`].
pub struct RenderScope<'a> {
    id: ControllerId,
    children: &'a [VNode],
    data: &'a ControllerData,
}

impl<'a> RenderScope<'a> {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Children supplied by whoever rendered this controller.
    pub fn children(&self) -> &'a [VNode] {
        self.children
    }

    pub fn model(&self) -> &'a Model {
        self.data.model()
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.data.get(key)
    }
}

pub trait Controller: AsAny {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        Rendered::List(cx.children().iter().cloned().map(Rendered::Node).collect())
    }

    /// Called once after properties are first assigned, before the first
    /// render.
    fn load(&mut self, _cx: &mut Scope<'_>) -> Load {
        Load::Ready
    }

    fn mounted(&mut self, _cx: &mut Scope<'_>) {}

    fn updated(&mut self, _cx: &mut Scope<'_>) {}

    fn removing(&mut self, _cx: &mut Scope<'_>) {}

    fn removed(&mut self, _cx: &mut Scope<'_>) {}

    /// Whether this controller exposes a handler named `name` for
    /// `on(event, name)` routing.
    fn handles(&self, _name: &str) -> bool {
        false
    }

    fn handle(
        &mut self,
        _name: &str,
        _event: Lifecycle,
        _source: ControllerId,
        _cx: &mut Scope<'_>,
    ) {
    }
}

pub type Listener<T> = Rc<dyn Fn(&mut Reconciler<T>, ControllerId) -> Result<(), ReconcileError>>;

pub(crate) enum ListenerEntry<T> {
    Closure(Listener<T>),
    Named { target: ControllerId, name: String },
}

impl<T> Clone for ListenerEntry<T> {
    fn clone(&self) -> Self {
        match self {
            ListenerEntry::Closure(listener) => ListenerEntry::Closure(Rc::clone(listener)),
            ListenerEntry::Named { target, name } => ListenerEntry::Named {
                target: *target,
                name: name.clone(),
            },
        }
    }
}

/// What an `id` resolves to in its owner's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTarget {
    View(ViewId),
    Controller(ControllerId),
}

pub(crate) struct ControllerSlot<T> {
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) ty: ControllerType,
    pub(crate) owner: Option<ControllerId>,
    pub(crate) id: Option<String>,
    pub(crate) ids: HashMap<String, IdTarget>,
    pub(crate) outer_children: Vec<VNode>,
    pub(crate) retained: Option<VNode>,
    pub(crate) placeholder: Option<ViewId>,
    pub(crate) data: ControllerData,
    pub(crate) load_state: LoadState,
    pub(crate) mounted: bool,
    pub(crate) listeners: Vec<(Lifecycle, ListenerEntry<T>)>,
}

impl<T> ControllerSlot<T> {
    pub(crate) fn new(ty: ControllerType, owner: Option<ControllerId>, outer_children: Vec<VNode>) -> Self {
        Self {
            controller: ty.instantiate(),
            ty,
            owner,
            id: None,
            ids: HashMap::default(),
            outer_children,
            retained: None,
            placeholder: None,
            data: ControllerData::default(),
            load_state: LoadState::Loading,
            mounted: false,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn render(&mut self, id: ControllerId) -> Rendered {
        let scope = RenderScope {
            id,
            children: &self.outer_children,
            data: &self.data,
        };
        self.controller.render(&scope)
    }
}

pub(crate) struct PendingLoad {
    pub(crate) id: ControllerId,
    pub(crate) future: LoadFuture,
}

struct FlushWaker {
    scheduler: Arc<dyn RuntimeScheduler>,
}

impl ArcWake for FlushWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.scheduler.request_flush();
    }
}

impl<T: ViewTree> Reconciler<T> {
    /// Run the controller's own hook for `event`, then its listeners in
    /// registration order.
    pub(crate) fn fire(&mut self, id: ControllerId, event: Lifecycle) -> Result<(), ReconcileError> {
        let runtime = self.runtime_handle();
        let Some(slot) = self.controllers.get_mut(id) else {
            return Ok(());
        };
        let mut scope = Scope::new(id, slot.owner, &mut slot.data, &runtime);
        match event {
            Lifecycle::Load => {
                if let Load::Pending(future) = slot.controller.load(&mut scope) {
                    self.loads.push(PendingLoad { id, future });
                    runtime.request_flush();
                } else {
                    slot.load_state = LoadState::Loaded;
                }
            }
            Lifecycle::Mounted => slot.controller.mounted(&mut scope),
            Lifecycle::Update => slot.controller.updated(&mut scope),
            Lifecycle::Remove => slot.controller.removing(&mut scope),
            Lifecycle::Removed => slot.controller.removed(&mut scope),
        }
        log::trace!("controller {id:?} ({}) fired {event:?}", slot.ty.name());
        self.notify(id, event)
    }

    fn notify(&mut self, id: ControllerId, event: Lifecycle) -> Result<(), ReconcileError> {
        let listeners: Vec<ListenerEntry<T>> = match self.controllers.get(id) {
            Some(slot) => slot
                .listeners
                .iter()
                .filter(|(registered, _)| *registered == event)
                .map(|(_, listener)| listener.clone())
                .collect(),
            None => return Ok(()),
        };
        for listener in listeners {
            match listener {
                ListenerEntry::Closure(listener) => listener(self, id)?,
                ListenerEntry::Named { target, name } => {
                    let runtime = self.runtime_handle();
                    if let Some(slot) = self.controllers.get_mut(target) {
                        let mut scope = Scope::new(target, slot.owner, &mut slot.data, &runtime);
                        slot.controller.handle(&name, event, id, &mut scope);
                    }
                }
            }
        }
        Ok(())
    }

    /// Register `listener` for `event` on controller `id`.
    pub fn add_listener(
        &mut self,
        id: ControllerId,
        event: Lifecycle,
        listener: impl Fn(&mut Reconciler<T>, ControllerId) -> Result<(), ReconcileError> + 'static,
    ) -> Result<(), ReconcileError> {
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or(ReconcileError::MissingController { id })?;
        slot.listeners
            .push((event, ListenerEntry::Closure(Rc::new(listener))));
        Ok(())
    }

    /// Route `event` on `id` to the handler called `name` on `id` itself or
    /// the nearest owner that declares it. Replaces any handler previously
    /// routed for the same event.
    pub fn add_default_listener(
        &mut self,
        id: ControllerId,
        event: Lifecycle,
        name: &str,
    ) -> Result<(), ReconcileError> {
        let mut candidate = Some(id);
        while let Some(current) = candidate {
            let slot = self
                .controllers
                .get(current)
                .ok_or(ReconcileError::MissingController { id: current })?;
            if slot.controller.handles(name) {
                let entry = ListenerEntry::Named {
                    target: current,
                    name: name.to_owned(),
                };
                if let Some(slot) = self.controllers.get_mut(id) {
                    slot.listeners.retain(|(registered, listener)| {
                        *registered != event || matches!(listener, ListenerEntry::Closure(_))
                    });
                    slot.listeners.push((event, entry));
                }
                return Ok(());
            }
            candidate = slot.owner;
        }
        Err(ReconcileError::HandlerNotFound {
            name: name.to_owned(),
        })
    }

    /// Assign a declared property on a live controller, scheduling a
    /// re-render when the value's fingerprint changed.
    pub fn set_property(
        &mut self,
        id: ControllerId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), ReconcileError> {
        let value = value.into();
        let slot = self
            .controllers
            .get(id)
            .ok_or(ReconcileError::MissingController { id })?;
        let index = slot
            .ty
            .resolve(name)
            .ok_or_else(|| ReconcileError::UnknownProperty {
                node: slot.ty.name(),
                name: name.to_owned(),
            })?;
        self.assign_controller_property(id, name, index, &value)
    }

    pub(crate) fn assign_controller_property(
        &mut self,
        id: ControllerId,
        name: &str,
        index: usize,
        value: &Value,
    ) -> Result<(), ReconcileError> {
        let runtime = self.runtime_handle();
        let Some(slot) = self.controllers.get_mut(id) else {
            return Ok(());
        };
        let key = DataKey::Prop(name.to_owned());
        let fingerprint = value.fingerprint();
        if !slot.data.changed(&key, fingerprint) {
            return Ok(());
        }
        let ty = slot.ty;
        ty.apply(&mut *slot.controller, index, value)
            .map_err(|source| ReconcileError::InvalidProperty {
                node: ty.name(),
                name: name.to_owned(),
                source,
            })?;
        slot.data.observe(key, fingerprint);
        runtime.mark_dirty(id);
        Ok(())
    }

    /// Store a model value on `id`; see [`Scope::set_model`].
    pub fn set_model(
        &mut self,
        id: ControllerId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), ReconcileError> {
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or(ReconcileError::MissingController { id })?;
        if slot.data.set_model(key, value.into()) {
            self.runtime.handle().mark_dirty(id);
        }
        Ok(())
    }

    /// Mutate a controller outside of rendering. Changes made through the
    /// scope schedule a re-render; direct field writes do not unless
    /// [`Scope::mark_dirty`] is called.
    pub fn update<C: Controller, R>(
        &mut self,
        id: ControllerId,
        f: impl FnOnce(&mut C, &mut Scope<'_>) -> R,
    ) -> Result<R, ReconcileError> {
        let runtime = self.runtime_handle();
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or(ReconcileError::MissingController { id })?;
        let mut scope = Scope::new(id, slot.owner, &mut slot.data, &runtime);
        let controller = (*slot.controller)
            .as_any_mut()
            .downcast_mut::<C>()
            .ok_or(ReconcileError::MissingController { id })?;
        Ok(f(controller, &mut scope))
    }

    pub fn controller<C: Controller>(&self, id: ControllerId) -> Option<&C> {
        (*self.controllers.get(id)?.controller)
            .as_any()
            .downcast_ref::<C>()
    }

    pub fn contains_controller(&self, id: ControllerId) -> bool {
        self.controllers.contains_key(id)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn owner(&self, id: ControllerId) -> Option<ControllerId> {
        self.controllers.get(id)?.owner
    }

    /// Resolve `name` in the id namespace of `owner`.
    pub fn lookup(&self, owner: ControllerId, name: &str) -> Option<IdTarget> {
        self.controllers.get(owner)?.ids.get(name).copied()
    }

    pub fn controller_id_of(&self, id: ControllerId) -> Option<&str> {
        self.controllers.get(id)?.id.as_deref()
    }

    pub fn model(&self, id: ControllerId) -> Option<&Model> {
        Some(self.controllers.get(id)?.data.model())
    }

    pub fn load_state(&self, id: ControllerId) -> Option<LoadState> {
        Some(self.controllers.get(id)?.load_state)
    }

    pub fn is_loaded(&self, id: ControllerId) -> bool {
        self.load_state(id) == Some(LoadState::Loaded)
    }

    pub fn is_mounted(&self, id: ControllerId) -> bool {
        self.controllers.get(id).is_some_and(|slot| slot.mounted)
    }

    /// The controller's retained tree (its last rendered output).
    pub fn retained(&self, id: ControllerId) -> Option<&VNode> {
        self.controllers.get(id)?.retained.as_ref()
    }

    /// Children the owner passed to `id` on its last render.
    pub fn outer_children(&self, id: ControllerId) -> Option<&[VNode]> {
        Some(&self.controllers.get(id)?.outer_children)
    }

    pub fn placeholder(&self, id: ControllerId) -> Option<ViewId> {
        self.controllers.get(id)?.placeholder
    }

    pub fn pending_loads(&self) -> usize {
        self.loads.len()
    }

    /// Poll every outstanding load once. Returns how many settled.
    pub fn poll_loads(&mut self) -> usize {
        if self.loads.is_empty() {
            return 0;
        }
        let waker = futures_task::waker(Arc::new(FlushWaker {
            scheduler: self.runtime.scheduler(),
        }));
        let mut cx = Context::from_waker(&waker);
        let mut settled = 0;
        let mut still_pending = Vec::new();
        for mut load in std::mem::take(&mut self.loads) {
            match load.future.as_mut().poll(&mut cx) {
                Poll::Pending => still_pending.push(load),
                Poll::Ready(result) => {
                    settled += 1;
                    let state = match result {
                        Ok(()) => LoadState::Loaded,
                        Err(err) => {
                            log::warn!("controller {:?} failed to load: {err}", load.id);
                            LoadState::Failed
                        }
                    };
                    if let Some(slot) = self.controllers.get_mut(load.id) {
                        slot.load_state = state;
                    }
                }
            }
        }
        self.loads = still_pending;
        settled
    }
}

impl fmt::Debug for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Load::Ready => f.write_str("Ready"),
            Load::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
