use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;

use trellis_core::{
    Controller, Load, LoadError, LoadState, Properties, RenderScope, Rendered, Scope, VNode,
    ViewId, ViewTree,
};
use trellis_runtime_std::{Host, HostOptions};
use trellis_testing::{Div, RecordingTree};

#[derive(Default, Properties)]
struct Profile {
    #[prop]
    fail: bool,
}

impl Controller for Profile {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        cx.get("name")
            .map(|name| name.to_string())
            .unwrap_or_else(|| "anonymous".to_owned())
            .into()
    }

    fn load(&mut self, cx: &mut Scope<'_>) -> Load {
        cx.set_model("name", "ada");
        let outcome: Result<(), LoadError> = if self.fail {
            Err("profile service unavailable".into())
        } else {
            Ok(())
        };
        Load::pending(async move { outcome })
    }
}

fn host_with_root() -> (Host<RecordingTree>, ViewId) {
    let mut views = RecordingTree::new();
    let root = views.create(Box::new(Div::default()));
    views.take_ops();
    (Host::with_options(views, HostOptions::default()), root)
}

#[test]
fn tick_settles_loads_requested_during_mount() {
    let (mut host, root) = host_with_root();
    let mounted = host
        .mount(VNode::controller::<Profile>(), root)
        .expect("mount profile");
    let id = host
        .reconciler()
        .root_controller(mounted)
        .expect("profile controller");

    assert_eq!(host.reconciler().load_state(id), Some(LoadState::Loading));
    assert_eq!(host.reconciler().views().inner().texts(root), vec!["ada"]);

    assert!(host.tick());
    assert!(host.reconciler().is_loaded(id));
    assert_eq!(host.reconciler().pending_loads(), 0);
}

#[test]
fn failed_load_is_recorded_without_breaking_the_tree() {
    let (mut host, root) = host_with_root();
    let mounted = host
        .mount(VNode::controller::<Profile>().prop("fail", true), root)
        .expect("mount profile");
    let id = host
        .reconciler()
        .root_controller(mounted)
        .expect("profile controller");

    host.settle(4);
    assert_eq!(host.reconciler().load_state(id), Some(LoadState::Failed));
    assert_eq!(host.reconciler().views().inner().texts(root), vec!["ada"]);
}

#[test]
fn idle_ticks_leave_the_tree_alone() {
    let (mut host, root) = host_with_root();
    host.mount(VNode::controller::<Profile>(), root)
        .expect("mount profile");
    host.settle(4);
    host.reconciler().views().take_ops();

    assert!(!host.tick());
    assert!(host.reconciler().views().ops().is_empty());
}

/// Completes once a worker thread, started on first poll, has finished.
#[derive(Default)]
struct Remote {
    done: Arc<AtomicBool>,
    started: bool,
}

impl Future for Remote {
    type Output = Result<(), LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.done.load(Ordering::SeqCst) {
            return Poll::Ready(Ok(()));
        }
        if !self.started {
            self.started = true;
            let done = Arc::clone(&self.done);
            let waker = cx.waker().clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                done.store(true, Ordering::SeqCst);
                waker.wake();
            });
        }
        Poll::Pending
    }
}

#[derive(Default, Properties)]
struct Feed;

impl Controller for Feed {
    fn render(&mut self, _cx: &RenderScope<'_>) -> Rendered {
        "feed".into()
    }

    fn load(&mut self, _cx: &mut Scope<'_>) -> Load {
        Load::pending(Remote::default())
    }
}

#[test]
fn host_sleeps_until_a_load_is_woken_from_another_thread() {
    let (mut host, root) = host_with_root();
    let mounted = host
        .mount(VNode::controller::<Feed>(), root)
        .expect("mount feed");
    let id = host
        .reconciler()
        .root_controller(mounted)
        .expect("feed controller");

    assert!(host.tick());
    assert_eq!(host.reconciler().load_state(id), Some(LoadState::Loading));

    assert!(host.wait_for_flush(Duration::from_secs(5)));
    assert!(host.tick());
    assert!(host.reconciler().is_loaded(id));
    assert_eq!(host.reconciler().pending_loads(), 0);
    assert_eq!(host.reconciler().views().inner().texts(root), vec!["feed"]);
}
