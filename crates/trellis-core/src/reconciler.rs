//! Tree realization, diffing and controller reconciliation.
//!
//! [`Reconciler`] owns the live [`ViewTree`], every controller instance and
//! the mounted roots. Nodes are realized on first sight, diffed against
//! their previous description on later renders and released when they
//! disappear. Controllers never reconcile synchronously when their data
//! changes; they are marked dirty and processed by [`Reconciler::flush`].

use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::controller::{ControllerId, ControllerSlot, IdTarget, Lifecycle, PendingLoad};
use crate::error::ReconcileError;
use crate::platform::RuntimeScheduler;
use crate::property::is_reserved;
use crate::runtime::{DefaultScheduler, Runtime, RuntimeHandle};
use crate::value::Value;
use crate::view::{Placeholder, ViewId, ViewTree};
use crate::vnode::{Live, Property, VNode, VNodeKind};

new_key_type! {
    pub struct RootId;
}

pub(crate) type Controllers<T> = SlotMap<ControllerId, ControllerSlot<T>>;

pub struct Reconciler<T> {
    pub(crate) views: T,
    pub(crate) controllers: Controllers<T>,
    pub(crate) runtime: Runtime,
    pub(crate) loads: Vec<PendingLoad>,
    roots: SlotMap<RootId, VNode>,
    flushing: bool,
}

impl<T: ViewTree> Reconciler<T> {
    pub fn new(views: T) -> Self {
        Self::with_scheduler(views, Arc::new(DefaultScheduler))
    }

    pub fn with_scheduler(views: T, scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self::with_runtime(views, Runtime::new(scheduler))
    }

    pub fn with_runtime(views: T, runtime: Runtime) -> Self {
        Self {
            views,
            controllers: SlotMap::with_key(),
            runtime,
            loads: Vec::new(),
            roots: SlotMap::with_key(),
            flushing: false,
        }
    }

    pub fn views(&self) -> &T {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut T {
        &mut self.views
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    /// Realize `node` and append it under `parent`.
    pub fn mount(&mut self, node: impl Into<VNode>, parent: ViewId) -> Result<RootId, ReconcileError> {
        let mut node = node.into();
        self.realize(None, &mut node)?;
        append_to(&mut self.views, &self.controllers, &node, parent)?;
        Ok(self.roots.insert(node))
    }

    pub fn unmount(&mut self, root: RootId) -> Result<(), ReconcileError> {
        match self.roots.remove(root) {
            Some(node) => self.remove_live(None, node),
            None => Ok(()),
        }
    }

    pub fn root(&self, root: RootId) -> Option<&VNode> {
        self.roots.get(root)
    }

    /// The controller a root was mounted with, if it is a controller node.
    pub fn root_controller(&self, root: RootId) -> Option<ControllerId> {
        self.roots.get(root)?.controller_id()
    }

    /// Schedule `id` for reconciliation in the next flush.
    pub fn mark_dirty(&self, id: ControllerId) {
        self.runtime.handle().mark_dirty(id);
    }

    pub fn has_pending(&self) -> bool {
        self.runtime.has_pending()
    }

    /// Reconcile every dirty controller in the order it was marked.
    /// Controllers marked while flushing are processed in the same pass.
    pub fn flush(&mut self) -> Result<(), ReconcileError> {
        if self.flushing {
            return Ok(());
        }
        self.flushing = true;
        self.runtime.begin_flush();
        let result = self.drain_pending();
        self.runtime.end_flush();
        self.flushing = false;
        result
    }

    fn drain_pending(&mut self) -> Result<(), ReconcileError> {
        while let Some(id) = self.runtime.next_pending() {
            self.reconcile(id)?;
        }
        Ok(())
    }

    /// Create the live counterpart of `node` and everything below it.
    pub fn realize(&mut self, owner: Option<ControllerId>, node: &mut VNode) -> Result<(), ReconcileError> {
        if node.live.is_some() {
            return Err(ReconcileError::AlreadyRealized {
                node: node.kind.name(),
            });
        }
        match node.kind {
            VNodeKind::Collection => self.realize_collection(owner, node),
            VNodeKind::Controller(ty) => {
                let outer_children = node.children.iter().flatten().cloned().collect();
                let id = self
                    .controllers
                    .insert(ControllerSlot::new(ty, owner, outer_children));
                node.live = Some(Live::Controller(id));
                log::trace!("realized controller {id:?} ({})", ty.name());
                self.assign_all(owner, node)?;
                self.fire(id, Lifecycle::Load)?;
                self.reconcile(id)
            }
            kind => {
                let view = kind
                    .instantiate_view()
                    .ok_or(ReconcileError::Unrealized { node: kind.name() })?;
                let parent = self.views.create(view);
                node.live = Some(Live::View(parent));
                for child in node.children.iter_mut().flatten() {
                    self.realize(owner, child)?;
                    append_to(&mut self.views, &self.controllers, child, parent)?;
                }
                self.assign_all(owner, node)
            }
        }
    }

    /// Bring the live state of `old` in line with `new`, transferring the
    /// live counterpart when the types match. Returns the last live
    /// position occupied by `new`.
    pub fn diff(
        &mut self,
        owner: Option<ControllerId>,
        mut old: VNode,
        new: &mut VNode,
        after: ViewId,
    ) -> Result<ViewId, ReconcileError> {
        if old.kind != new.kind || self.is_released(&old) {
            self.realize(owner, new)?;
            let last = place_after(&mut self.views, &self.controllers, new, after)?;
            self.remove_live(owner, old)?;
            return Ok(last);
        }
        if new.kind == VNodeKind::Collection {
            return self.diff_collection(owner, old, new);
        }
        new.live = old.live.take();
        self.diff_props(owner, &old, new)?;
        match new.live {
            Some(Live::Controller(id)) => {
                if !old.children.is_empty() || !new.children.is_empty() {
                    if let Some(slot) = self.controllers.get_mut(id) {
                        slot.outer_children = new.children.iter().flatten().cloned().collect();
                        self.runtime.handle().mark_dirty(id);
                    }
                }
            }
            Some(Live::View(parent)) => self.diff_children(owner, old.children, new, parent)?,
            _ => {}
        }
        anchor(&self.controllers, new)
    }

    fn diff_props(&mut self, owner: Option<ControllerId>, old: &VNode, new: &VNode) -> Result<(), ReconcileError> {
        if old.props_fingerprint == new.props_fingerprint {
            return Ok(());
        }
        for (name, property) in &new.props {
            let previous = old.props.get(name);
            if previous.map_or(true, |previous| previous.fingerprint() != property.fingerprint()) {
                self.write_property(owner, new, name, property, previous)?;
            }
        }
        Ok(())
    }

    /// Whether `node` stands for a controller that was removed directly
    /// while its owner still retained it.
    pub(crate) fn is_released(&self, node: &VNode) -> bool {
        matches!(node.live, Some(Live::Controller(id)) if !self.controllers.contains_key(id))
    }

    fn diff_children(
        &mut self,
        owner: Option<ControllerId>,
        old_children: Vec<Option<VNode>>,
        new: &mut VNode,
        parent: ViewId,
    ) -> Result<(), ReconcileError> {
        let count = old_children.len().max(new.children.len());
        let mut old_children = old_children.into_iter();
        let mut prev: Option<ViewId> = None;
        for index in 0..count {
            let old_child = old_children.next().flatten();
            let new_child = new.children.get_mut(index).and_then(Option::as_mut);
            let slot = match prev {
                Some(prev) => Slot::After(prev),
                None => Slot::First(parent),
            };
            match (old_child, new_child) {
                (Some(old_child), Some(new_child)) if self.is_released(&old_child) => {
                    self.realize(owner, new_child)?;
                    prev = Some(place(&mut self.views, &self.controllers, new_child, slot)?);
                }
                (Some(old_child), Some(new_child)) => {
                    if old_child.fingerprint != new_child.fingerprint {
                        let after = match prev {
                            Some(prev) => prev,
                            None => anchor(&self.controllers, &old_child)?,
                        };
                        prev = Some(self.diff(owner, old_child, new_child, after)?);
                    } else {
                        *new_child = old_child;
                        if let Some(last) = last_view(&self.controllers, new_child)? {
                            prev = Some(last);
                        }
                    }
                }
                (Some(old_child), None) => self.remove_live(owner, old_child)?,
                (None, Some(new_child)) => {
                    self.realize(owner, new_child)?;
                    prev = Some(place(&mut self.views, &self.controllers, new_child, slot)?);
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn assign_all(&mut self, owner: Option<ControllerId>, node: &VNode) -> Result<(), ReconcileError> {
        for (name, property) in &node.props {
            self.write_property(owner, node, name, property, None)?;
        }
        Ok(())
    }

    fn write_property(
        &mut self,
        owner: Option<ControllerId>,
        node: &VNode,
        name: &str,
        property: &Property,
        previous: Option<&Property>,
    ) -> Result<(), ReconcileError> {
        if name == "id" {
            let Some(target) = id_target(node) else {
                return Ok(());
            };
            return self.assign_id(owner, target, previous.map(Property::value), property.value());
        }
        if is_reserved(name) {
            return Ok(());
        }
        let unknown = || ReconcileError::UnknownProperty {
            node: node.kind.name(),
            name: name.to_owned(),
        };
        match (&node.kind, node.live.as_ref()) {
            (VNodeKind::Controller(_), Some(Live::Controller(id))) => {
                if let Some(event) = Lifecycle::from_property(name) {
                    return match property.value() {
                        Value::Null => Ok(()),
                        handler => self.add_default_listener(*id, event, &handler.to_string()),
                    };
                }
                let index = property.slot.ok_or_else(unknown)?;
                self.assign_controller_property(*id, name, index, property.value())
            }
            (kind, Some(Live::View(view))) => {
                let index = property.slot.ok_or_else(unknown)?;
                let target = self.views.get_mut(*view)?;
                kind.apply_view(target, index, property.value())
                    .map_err(|source| ReconcileError::InvalidProperty {
                        node: kind.name(),
                        name: name.to_owned(),
                        source,
                    })
            }
            _ => Ok(()),
        }
    }

    fn assign_id(
        &mut self,
        owner: Option<ControllerId>,
        target: IdTarget,
        previous: Option<&Value>,
        value: &Value,
    ) -> Result<(), ReconcileError> {
        let previous = previous.filter(|value| !value.is_null()).map(Value::to_string);
        let next = Some(value).filter(|value| !value.is_null()).map(Value::to_string);
        if let Some(slot) = owner.and_then(|owner| self.controllers.get_mut(owner)) {
            if let Some(previous) = &previous {
                if slot.ids.get(previous) == Some(&target) {
                    slot.ids.remove(previous);
                }
            }
            if let Some(next) = &next {
                if slot.ids.contains_key(next) {
                    return Err(ReconcileError::DuplicateId { id: next.clone() });
                }
                slot.ids.insert(next.clone(), target);
            }
        }
        if let IdTarget::Controller(id) = target {
            if let Some(slot) = self.controllers.get_mut(id) {
                slot.id = next;
            }
        }
        Ok(())
    }

    fn purge_id(&mut self, owner: Option<ControllerId>, node: &VNode, target: IdTarget) {
        let Some(id) = node.id() else {
            return;
        };
        if let Some(slot) = owner.and_then(|owner| self.controllers.get_mut(owner)) {
            if slot.ids.get(&id) == Some(&target) {
                slot.ids.remove(&id);
            }
        }
    }

    /// Re-render controller `id` and reconcile the output against its
    /// retained tree. A controller that no longer exists is skipped.
    pub fn reconcile(&mut self, id: ControllerId) -> Result<(), ReconcileError> {
        self.runtime.clear_pending(id);
        let Some(slot) = self.controllers.get_mut(id) else {
            return Ok(());
        };
        let next = slot.render(id).into_node();
        let placeholder = slot.placeholder;
        let reused = match (&slot.retained, &next) {
            (Some(previous), Some(next)) => previous.fingerprint == next.fingerprint,
            _ => false,
        };
        // Resolved while the retained tree is still in place, so a failure
        // leaves it untouched.
        let after = match self.controllers.get(id).and_then(|slot| slot.retained.as_ref()) {
            Some(previous) if !reused => Some(anchor(&self.controllers, previous)?),
            _ => None,
        };
        let previous = self
            .controllers
            .get_mut(id)
            .and_then(|slot| slot.retained.take());

        let (retained, changed) = match (previous, next, after) {
            (Some(previous), Some(mut next), Some(after)) => {
                self.diff(Some(id), previous, &mut next, after)?;
                (Some(next), true)
            }
            (Some(previous), Some(_), None) => (Some(previous), false),
            (Some(previous), None, after) => {
                let after = after.ok_or(ReconcileError::Unrealized {
                    node: previous.kind.name(),
                })?;
                let holder = self.views.create(Box::new(Placeholder));
                self.views.after_to(holder, after)?;
                if let Some(slot) = self.controllers.get_mut(id) {
                    slot.placeholder = Some(holder);
                }
                self.remove_live(Some(id), previous)?;
                (None, true)
            }
            (None, Some(mut next), _) => {
                self.realize(Some(id), &mut next)?;
                if let Some(holder) = placeholder {
                    place_after(&mut self.views, &self.controllers, &next, holder)?;
                    self.views.remove(holder)?;
                    if let Some(slot) = self.controllers.get_mut(id) {
                        slot.placeholder = None;
                    }
                }
                (Some(next), true)
            }
            (None, None, _) => {
                if placeholder.is_none() {
                    let holder = self.views.create(Box::new(Placeholder));
                    if let Some(slot) = self.controllers.get_mut(id) {
                        slot.placeholder = Some(holder);
                    }
                }
                (None, false)
            }
        };

        let Some(slot) = self.controllers.get_mut(id) else {
            // Removed by a listener while its output was being diffed.
            if let Some(orphan) = retained {
                self.remove_live(None, orphan)?;
            }
            return Ok(());
        };
        slot.retained = retained;
        let first_mount = !slot.mounted;
        slot.mounted = true;
        if first_mount {
            self.fire(id, Lifecycle::Mounted)?;
        }
        if changed {
            self.fire(id, Lifecycle::Update)?;
        }
        Ok(())
    }

    /// Tear down controller `id`: fire `Remove`, release its live output,
    /// fire `Removed` and drop it. Re-entrant calls while `Remove` handlers
    /// run are ignored.
    pub fn remove(&mut self, id: ControllerId) -> Result<(), ReconcileError> {
        let Some(slot) = self.controllers.get(id) else {
            return Ok(());
        };
        if slot.retained.is_none() && slot.placeholder.is_none() {
            return Ok(());
        }
        if let Some(owner) = slot.owner.and_then(|owner| self.controllers.get(owner)) {
            let is_owner_root = owner
                .retained
                .as_ref()
                .and_then(VNode::controller_id)
                .is_some_and(|root| root == id);
            if is_owner_root {
                return Err(ReconcileError::IllegalRemoval { controller: id });
            }
        }
        self.release_controller(id)
    }

    fn release_controller(&mut self, id: ControllerId) -> Result<(), ReconcileError> {
        if !self.runtime.begin_removal(id) {
            return Ok(());
        }
        let fired = self.fire(id, Lifecycle::Remove);
        self.runtime.end_removal(id);
        fired?;

        let Some(slot) = self.controllers.get_mut(id) else {
            return Ok(());
        };
        let retained = slot.retained.take();
        let placeholder = slot.placeholder.take();
        match retained {
            Some(node) => self.remove_live(Some(id), node)?,
            None => {
                if let Some(holder) = placeholder {
                    self.views.remove(holder)?;
                }
            }
        }
        self.fire(id, Lifecycle::Removed)?;
        self.runtime.clear_pending(id);
        self.loads.retain(|load| load.id != id);
        if let Some(slot) = self.controllers.remove(id) {
            if let (Some(owner), Some(name)) = (slot.owner, slot.id) {
                if let Some(owner) = self.controllers.get_mut(owner) {
                    if owner.ids.get(&name) == Some(&IdTarget::Controller(id)) {
                        owner.ids.remove(&name);
                    }
                }
            }
        }
        log::trace!("removed controller {id:?}");
        Ok(())
    }

    /// Remove the live counterpart of `node` from the tree.
    pub(crate) fn remove_live(&mut self, owner: Option<ControllerId>, node: VNode) -> Result<(), ReconcileError> {
        match node.live {
            Some(Live::View(view)) => {
                self.release_descendants(owner, &node)?;
                self.purge_id(owner, &node, IdTarget::View(view));
                self.views.remove(view)
            }
            Some(Live::Controller(id)) => {
                self.purge_id(owner, &node, IdTarget::Controller(id));
                self.release_controller(id)
            }
            Some(Live::Collection(ref state)) => {
                let placeholder = state.placeholder;
                for item in node.children.into_iter().flatten() {
                    self.remove_live(owner, item)?;
                }
                match placeholder {
                    Some(holder) => self.views.remove(holder),
                    None => Ok(()),
                }
            }
            None => Ok(()),
        }
    }

    /// Release controllers and id registrations below a view that is about
    /// to be dropped with its subtree.
    fn release_descendants(&mut self, owner: Option<ControllerId>, node: &VNode) -> Result<(), ReconcileError> {
        for child in node.children.iter().flatten() {
            match child.live {
                Some(Live::View(view)) => {
                    self.release_descendants(owner, child)?;
                    self.purge_id(owner, child, IdTarget::View(view));
                }
                Some(Live::Controller(id)) => {
                    self.purge_id(owner, child, IdTarget::Controller(id));
                    self.release_controller(id)?;
                }
                Some(Live::Collection(_)) => self.release_descendants(owner, child)?,
                None => {}
            }
        }
        Ok(())
    }
}

fn id_target(node: &VNode) -> Option<IdTarget> {
    match node.live {
        Some(Live::View(view)) => Some(IdTarget::View(view)),
        Some(Live::Controller(id)) => Some(IdTarget::Controller(id)),
        _ => None,
    }
}

/// Last live position occupied by `node`.
pub(crate) fn anchor<T>(controllers: &Controllers<T>, node: &VNode) -> Result<ViewId, ReconcileError> {
    last_view(controllers, node)?.ok_or(ReconcileError::Unrealized {
        node: node.kind.name(),
    })
}

/// Last live view of `node`, if released controllers left it any.
fn last_view<T>(controllers: &Controllers<T>, node: &VNode) -> Result<Option<ViewId>, ReconcileError> {
    let mut views = Vec::new();
    top_views(controllers, node, &mut views)?;
    Ok(views.last().copied())
}

/// Where the next live view goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    After(ViewId),
    First(ViewId),
}

impl Slot {
    /// Move `id` into this slot unless it is already there.
    pub(crate) fn fill<T: ViewTree>(self, views: &mut T, id: ViewId) -> Result<(), ReconcileError> {
        match self {
            Slot::After(prev) if views.next_sibling(prev) != Some(id) => views.after_to(id, prev),
            Slot::First(parent) if views.children(parent).first() != Some(&id) => {
                views.prepend_to(id, parent)
            }
            _ => Ok(()),
        }
    }
}

/// Top-level live views of `node`, in order.
fn top_views<T>(controllers: &Controllers<T>, node: &VNode, out: &mut Vec<ViewId>) -> Result<(), ReconcileError> {
    let unrealized = || ReconcileError::Unrealized {
        node: node.kind.name(),
    };
    match &node.live {
        Some(Live::View(view)) => out.push(*view),
        Some(Live::Collection(state)) => match state.placeholder {
            Some(holder) => out.push(holder),
            None => {
                for item in node.children.iter().flatten() {
                    top_views(controllers, item, out)?;
                }
            }
        },
        Some(Live::Controller(id)) => {
            // Released through `Reconciler::remove`; its views are gone.
            let Some(slot) = controllers.get(*id) else {
                return Ok(());
            };
            match (&slot.retained, slot.placeholder) {
                (Some(retained), _) => top_views(controllers, retained, out)?,
                (None, Some(holder)) => out.push(holder),
                (None, None) => return Err(unrealized()),
            }
        }
        None => return Err(unrealized()),
    }
    Ok(())
}

/// First live position occupied by `node`.
pub(crate) fn first_view<T>(controllers: &Controllers<T>, node: &VNode) -> Result<ViewId, ReconcileError> {
    let mut views = Vec::new();
    top_views(controllers, node, &mut views)?;
    views.first().copied().ok_or(ReconcileError::Unrealized {
        node: node.kind.name(),
    })
}

/// Move the live views of `node` into `slot`, keeping their order, and
/// return the last one.
pub(crate) fn place<T: ViewTree>(
    views: &mut T,
    controllers: &Controllers<T>,
    node: &VNode,
    slot: Slot,
) -> Result<ViewId, ReconcileError> {
    let mut ids = Vec::new();
    top_views(controllers, node, &mut ids)?;
    let mut slot = slot;
    let mut last = None;
    for id in ids {
        slot.fill(views, id)?;
        slot = Slot::After(id);
        last = Some(id);
    }
    last.ok_or(ReconcileError::Unrealized {
        node: node.kind.name(),
    })
}

pub(crate) fn place_after<T: ViewTree>(
    views: &mut T,
    controllers: &Controllers<T>,
    node: &VNode,
    prev: ViewId,
) -> Result<ViewId, ReconcileError> {
    place(views, controllers, node, Slot::After(prev))
}

/// Append every live view of `node` to `parent`, keeping their order.
pub(crate) fn append_to<T: ViewTree>(
    views: &mut T,
    controllers: &Controllers<T>,
    node: &VNode,
    parent: ViewId,
) -> Result<(), ReconcileError> {
    let mut ids = Vec::new();
    top_views(controllers, node, &mut ids)?;
    for id in ids {
        views.append_to(id, parent)?;
    }
    Ok(())
}
