use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::collections::map::{HashSet, IndexSet};
use crate::controller::ControllerId;
use crate::platform::RuntimeScheduler;

/// Conditions reported at most once per runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// A collection item had no `key` and fell back to its position.
    UndefinedKey,
}

impl Warning {
    pub fn tag(&self) -> &'static str {
        match self {
            Warning::UndefinedKey => "UndefinedDOMKey",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UndefinedKey => write!(
                f,
                "[{}] collection item has no key; falling back to its index",
                self.tag()
            ),
        }
    }
}

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    pending: RefCell<IndexSet<ControllerId>>,
    flush_requested: Cell<bool>,
    removing: RefCell<HashSet<ControllerId>>,
    warned: RefCell<HashSet<Warning>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            pending: RefCell::new(IndexSet::default()),
            flush_requested: Cell::new(false),
            removing: RefCell::new(HashSet::default()),
            warned: RefCell::new(HashSet::default()),
        }
    }

    fn request_flush(&self) {
        if !self.flush_requested.replace(true) {
            self.scheduler.request_flush();
        }
    }

    fn mark_dirty(&self, id: ControllerId) {
        if self.pending.borrow_mut().insert(id) {
            log::trace!("controller {id:?} marked dirty");
            self.request_flush();
        }
    }

    fn clear_pending(&self, id: ControllerId) {
        self.pending.borrow_mut().shift_remove(&id);
    }

    fn next_pending(&self) -> Option<ControllerId> {
        self.pending.borrow().first().copied()
    }

    fn warn_once(&self, warning: Warning) {
        if self.warned.borrow_mut().insert(warning) {
            log::warn!("{warning}");
        }
    }
}

#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn scheduler(&self) -> Arc<dyn RuntimeScheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_pending(&self, id: ControllerId) -> bool {
        self.inner.pending.borrow().contains(&id)
    }

    /// True between a flush request and the end of the next flush.
    pub fn flush_requested(&self) -> bool {
        self.inner.flush_requested.get()
    }

    pub fn has_warned(&self, warning: Warning) -> bool {
        self.inner.warned.borrow().contains(&warning)
    }

    pub(crate) fn begin_flush(&self) {
        self.inner.flush_requested.set(true);
    }

    pub(crate) fn end_flush(&self) {
        self.inner.flush_requested.set(false);
    }

    pub(crate) fn next_pending(&self) -> Option<ControllerId> {
        self.inner.next_pending()
    }

    pub(crate) fn clear_pending(&self, id: ControllerId) {
        self.inner.clear_pending(id);
    }

    /// Returns `false` when `id` is already being removed.
    pub(crate) fn begin_removal(&self, id: ControllerId) -> bool {
        self.inner.removing.borrow_mut().insert(id)
    }

    pub(crate) fn end_removal(&self, id: ControllerId) {
        self.inner.removing.borrow_mut().remove(&id);
    }
}

/// Weak handle to the runtime, handed to controllers through their scope.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn mark_dirty(&self, id: ControllerId) {
        if let Some(inner) = self.0.upgrade() {
            inner.mark_dirty(id);
        }
    }

    pub fn request_flush(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_flush();
        }
    }

    pub fn warn_once(&self, warning: Warning) {
        if let Some(inner) = self.0.upgrade() {
            inner.warn_once(warning);
        }
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn request_flush(&self) {}
}
