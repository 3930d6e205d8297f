//! Standard runtime services backed by Rust's `std` library.
//!
//! [`StdScheduler`] implements the scheduling hook from `trellis-core` with a
//! flag guarded by a condition variable, so a host thread can sleep until a
//! flush is requested from anywhere, including a load future woken on
//! another thread. [`Host`] owns a [`Reconciler`] and drives it from those
//! requests.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use trellis_core::{ReconcileError, Reconciler, RootId, RuntimeScheduler, VNode, ViewId, ViewTree};

/// Scheduler that records flush requests and wakes a waiting host.
#[derive(Default)]
pub struct StdScheduler {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn requested(&self) -> MutexGuard<'_, bool> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether a flush has been requested since the last call.
    pub fn take_flush_request(&self) -> bool {
        std::mem::take(&mut *self.requested())
    }

    /// Block until a flush is requested or `timeout` elapses. The request
    /// is left in place for [`take_flush_request`](Self::take_flush_request).
    pub fn wait_for_flush(&self, timeout: Duration) -> bool {
        let (requested, _) = self
            .wake
            .wait_timeout_while(self.requested(), timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *requested
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("flush_requested", &*self.requested())
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn request_flush(&self) {
        *self.requested() = true;
        self.wake.notify_all();
    }
}

/// Knobs for [`Host`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOptions {
    /// Log the live tree at debug level after every tick that did work.
    pub dump_tree: bool,
}

impl HostOptions {
    /// Defaults, with `dump_tree` enabled when `TRELLIS_DEBUG` is set.
    pub fn from_env() -> Self {
        Self {
            dump_tree: std::env::var("TRELLIS_DEBUG").is_ok(),
        }
    }
}

/// Owns a reconciler and runs it on demand.
pub struct Host<T: ViewTree> {
    scheduler: Arc<StdScheduler>,
    reconciler: Reconciler<T>,
    options: HostOptions,
}

impl<T: ViewTree> Host<T> {
    pub fn new(views: T) -> Self {
        Self::with_options(views, HostOptions::from_env())
    }

    pub fn with_options(views: T, options: HostOptions) -> Self {
        let scheduler = Arc::new(StdScheduler::new());
        let reconciler = Reconciler::with_scheduler(views, scheduler.clone());
        Self {
            scheduler,
            reconciler,
            options,
        }
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn reconciler(&self) -> &Reconciler<T> {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler<T> {
        &mut self.reconciler
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn mount(&mut self, node: impl Into<VNode>, parent: ViewId) -> Result<RootId, ReconcileError> {
        self.reconciler.mount(node, parent)
    }

    /// Handle an outstanding flush request, if any: poll pending loads,
    /// then flush dirty controllers. Returns whether anything ran.
    ///
    /// A flush drains controllers dirtied while it runs, so one pass per
    /// tick is enough. Reconcile errors are logged rather than returned;
    /// the tree keeps whatever state it reached.
    pub fn tick(&mut self) -> bool {
        if !self.scheduler.take_flush_request() {
            return false;
        }
        let settled = self.reconciler.poll_loads();
        if settled > 0 {
            log::debug!("{settled} controller load(s) settled");
        }
        if let Err(err) = self.reconciler.flush() {
            log::error!("flush failed: {err}");
        }
        if self.options.dump_tree {
            log::debug!("live tree:\n{}", self.reconciler.views().dump());
        }
        true
    }

    /// Sleep until a flush is requested or `timeout` elapses. Returns
    /// whether a tick now has work to do.
    pub fn wait_for_flush(&self, timeout: Duration) -> bool {
        self.scheduler.wait_for_flush(timeout)
    }

    /// Tick until no flush is requested, up to `max_ticks` times. Returns
    /// the number of ticks that ran.
    pub fn settle(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.tick() {
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use trellis_core::{
        Controller, MemoryViewTree, Placeholder, Properties, RenderScope, Rendered,
        RuntimeScheduler, Scope, VNode, ViewTree,
    };

    use super::{Host, HostOptions, StdScheduler};

    #[derive(Default, Properties)]
    struct Counter {
        #[prop]
        start: i64,
    }

    impl Controller for Counter {
        fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
            let count = cx.get("count").map(|value| value.to_string());
            count.unwrap_or_else(|| self.start.to_string()).into()
        }

        fn mounted(&mut self, cx: &mut Scope<'_>) {
            cx.set_model("count", self.start + 1);
        }
    }

    #[test]
    fn scheduler_records_flush_requests() {
        let scheduler = StdScheduler::new();
        assert!(!scheduler.take_flush_request());
        scheduler.request_flush();
        scheduler.request_flush();
        assert!(scheduler.take_flush_request(), "request should be observed once");
        assert!(!scheduler.take_flush_request());
    }

    #[test]
    fn waiting_returns_once_another_thread_requests_a_flush() {
        let scheduler = Arc::new(StdScheduler::new());
        assert!(!scheduler.wait_for_flush(Duration::from_millis(10)));

        let remote = Arc::clone(&scheduler);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request_flush();
        });
        assert!(scheduler.wait_for_flush(Duration::from_secs(5)));
        assert!(scheduler.take_flush_request());
        worker.join().expect("worker thread");
    }

    #[test]
    fn host_tick_flushes_model_changes() {
        let mut views = MemoryViewTree::new();
        let root = views.create(Box::new(Placeholder));
        let mut host = Host::with_options(views, HostOptions::default());
        let mounted = host
            .mount(VNode::controller::<Counter>().prop("start", 4), root)
            .expect("mount counter");
        let id = host
            .reconciler()
            .root_controller(mounted)
            .expect("root controller");

        assert_eq!(host.reconciler().views().texts(root), vec!["4".to_string()]);
        assert!(host.reconciler().runtime().is_pending(id));

        assert!(host.tick(), "mounted hook should have requested a flush");
        assert_eq!(host.reconciler().views().texts(root), vec!["5".to_string()]);
        assert!(!host.reconciler().has_pending());
        assert!(!host.tick(), "nothing left to do");
    }

    #[test]
    fn settle_stops_when_idle() {
        let views = MemoryViewTree::new();
        let mut host = Host::with_options(views, HostOptions::default());
        assert_eq!(host.settle(10), 0);
    }
}
