use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_core::{
    MemoryViewTree, Properties, ReconcileError, Reconciler, RootId, RuntimeScheduler, View,
    ViewId, ViewTree, VNode,
};

/// A structural operation observed on a [`RecordingTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOp {
    Create { id: ViewId, name: &'static str },
    Update { id: ViewId },
    AppendTo { id: ViewId, parent: ViewId },
    AfterTo { id: ViewId, prev: ViewId },
    PrependTo { id: ViewId, parent: ViewId },
    Remove { id: ViewId },
}

impl ViewOp {
    pub fn is_create(&self) -> bool {
        matches!(self, ViewOp::Create { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, ViewOp::Update { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, ViewOp::Remove { .. })
    }

    pub fn is_move(&self) -> bool {
        matches!(
            self,
            ViewOp::AppendTo { .. } | ViewOp::AfterTo { .. } | ViewOp::PrependTo { .. }
        )
    }
}

/// [`MemoryViewTree`] that logs every operation performed on it.
#[derive(Default)]
pub struct RecordingTree {
    inner: MemoryViewTree,
    log: Rc<RefCell<Vec<ViewOp>>>,
}

impl RecordingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryViewTree {
        &self.inner
    }

    pub fn log(&self) -> Rc<RefCell<Vec<ViewOp>>> {
        Rc::clone(&self.log)
    }

    pub fn ops(&self) -> Vec<ViewOp> {
        self.log.borrow().clone()
    }

    pub fn take_ops(&self) -> Vec<ViewOp> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn count(&self, predicate: impl Fn(&ViewOp) -> bool) -> usize {
        self.log.borrow().iter().filter(|op| predicate(op)).count()
    }

    fn record(&self, op: ViewOp) {
        self.log.borrow_mut().push(op);
    }
}

impl ViewTree for RecordingTree {
    fn create(&mut self, view: Box<dyn View>) -> ViewId {
        let type_name = view.type_name();
        let name = type_name.rsplit("::").next().unwrap_or(type_name);
        let id = self.inner.create(view);
        self.record(ViewOp::Create { id, name });
        id
    }

    fn get_mut(&mut self, id: ViewId) -> Result<&mut dyn View, ReconcileError> {
        self.log.borrow_mut().push(ViewOp::Update { id });
        self.inner.get_mut(id)
    }

    fn append_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError> {
        self.record(ViewOp::AppendTo { id, parent });
        self.inner.append_to(id, parent)
    }

    fn after_to(&mut self, id: ViewId, prev: ViewId) -> Result<(), ReconcileError> {
        self.record(ViewOp::AfterTo { id, prev });
        self.inner.after_to(id, prev)
    }

    fn prepend_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError> {
        self.record(ViewOp::PrependTo { id, parent });
        self.inner.prepend_to(id, parent)
    }

    fn remove(&mut self, id: ViewId) -> Result<(), ReconcileError> {
        self.record(ViewOp::Remove { id });
        self.inner.remove(id)
    }

    fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.inner.parent(id)
    }

    fn children(&self, id: ViewId) -> Vec<ViewId> {
        self.inner.children(id)
    }

    fn dump(&self) -> String {
        self.inner.dump()
    }
}

/// Scheduler that only counts flush requests.
#[derive(Default)]
pub struct ManualScheduler {
    requests: AtomicUsize,
}

impl ManualScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RuntimeScheduler for ManualScheduler {
    fn request_flush(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Generic container element used by tests.
#[derive(Debug, Default, Properties)]
pub struct Div {
    #[prop]
    pub title: String,
    #[prop]
    pub width: i64,
    #[prop(rename = "class")]
    pub class_name: Option<String>,
}

impl View for Div {}

/// Second container type, for type-mismatch scenarios.
#[derive(Debug, Default, Properties)]
pub struct Span {
    #[prop]
    pub title: String,
}

impl View for Span {}

/// Reconciler over a [`RecordingTree`] with one root container and a
/// [`ManualScheduler`].
pub struct TestHarness {
    reconciler: Reconciler<RecordingTree>,
    scheduler: Arc<ManualScheduler>,
    root: ViewId,
}

impl TestHarness {
    pub fn new() -> Self {
        let scheduler = Arc::new(ManualScheduler::default());
        let mut views = RecordingTree::new();
        let root = views.create(Box::new(Div::default()));
        views.take_ops();
        let reconciler = Reconciler::with_scheduler(views, scheduler.clone());
        Self {
            reconciler,
            scheduler,
            root,
        }
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn reconciler(&self) -> &Reconciler<RecordingTree> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler<RecordingTree> {
        &mut self.reconciler
    }

    pub fn mount(&mut self, node: impl Into<VNode>) -> Result<RootId, ReconcileError> {
        self.reconciler.mount(node, self.root)
    }

    pub fn flush(&mut self) -> Result<(), ReconcileError> {
        self.reconciler.flush()
    }

    pub fn tree(&self) -> &MemoryViewTree {
        self.reconciler.views().inner()
    }

    /// Text leaves under the root container, in tree order.
    pub fn texts(&self) -> Vec<String> {
        self.tree().texts(self.root)
    }

    pub fn ops(&self) -> Vec<ViewOp> {
        self.reconciler.views().ops()
    }

    pub fn take_ops(&self) -> Vec<ViewOp> {
        self.reconciler.views().take_ops()
    }

    pub fn dump(&self) -> String {
        self.tree().dump_tree(Some(self.root))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
