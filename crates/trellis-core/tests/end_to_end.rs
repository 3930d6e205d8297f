use std::cell::RefCell;
use std::rc::Rc;

use trellis_core::{
    Controller, ControllerId, Lifecycle, Properties, RenderScope, Rendered, VNode, Value,
    ViewTree,
};
use trellis_testing::{Div, TestHarness, ViewOp};

#[derive(Default, Properties)]
struct Letters;

impl Controller for Letters {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        let middle = cx
            .get("y")
            .map(Value::to_string)
            .unwrap_or_else(|| "2".to_owned());
        vec![
            VNode::text("1").keyed("x"),
            VNode::text(middle).keyed("y"),
            VNode::text("3").keyed("z"),
        ]
        .into()
    }
}

fn mount<C: Controller + Properties + Default>(harness: &mut TestHarness) -> ControllerId {
    let mounted = harness
        .mount(VNode::controller::<C>())
        .expect("mount controller");
    harness
        .reconciler()
        .root_controller(mounted)
        .expect("root controller")
}

#[test]
fn content_change_on_one_key_mutates_exactly_one_view() {
    let mut harness = TestHarness::new();
    let id = mount::<Letters>(&mut harness);
    assert_eq!(harness.texts(), vec!["1", "2", "3"]);
    let views = harness.tree().children(harness.root());
    harness.take_ops();

    harness
        .reconciler_mut()
        .set_model(id, "y", "2*")
        .expect("change y");
    harness.flush().expect("flush");

    assert_eq!(harness.texts(), vec!["1", "2*", "3"]);
    assert_eq!(harness.take_ops(), vec![ViewOp::Update { id: views[1] }]);
    assert_eq!(harness.tree().children(harness.root()), views);
}

#[test]
fn rerender_with_equal_fingerprint_touches_nothing() {
    let mut harness = TestHarness::new();
    let id = mount::<Letters>(&mut harness);
    harness.take_ops();

    harness.reconciler().mark_dirty(id);
    harness.flush().expect("flush");
    assert!(harness.take_ops().is_empty());
}

#[derive(Default, Properties)]
struct Card {
    #[prop]
    title: String,
}

impl Controller for Card {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        VNode::element::<Div>()
            .prop("title", self.title.clone())
            .children(cx.children().iter().cloned())
            .into()
    }
}

#[derive(Default, Properties)]
struct Page;

impl Controller for Page {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        let body = cx
            .get("body")
            .map(Value::to_string)
            .unwrap_or_else(|| "empty".to_owned());
        VNode::element::<Div>()
            .child(VNode::controller::<Card>().prop("title", "card").child(body))
            .into()
    }
}

#[test]
fn children_passed_to_a_nested_controller_update_in_the_same_flush() {
    let mut harness = TestHarness::new();
    let page = mount::<Page>(&mut harness);
    assert_eq!(harness.texts(), vec!["empty"]);

    let card = harness
        .reconciler()
        .retained(page)
        .and_then(|node| node.children()[0].as_ref())
        .and_then(VNode::controller_id)
        .expect("card controller");
    let card_view = harness
        .reconciler()
        .retained(card)
        .and_then(VNode::view_id)
        .expect("card view");
    assert_eq!(harness.reconciler().owner(card), Some(page));

    harness
        .reconciler_mut()
        .set_model(page, "body", "full")
        .expect("set body");
    harness.flush().expect("flush");

    assert_eq!(harness.texts(), vec!["full"]);
    assert!(!harness.reconciler().has_pending());
    let passed = harness.reconciler().outer_children(card).expect("card children");
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].prop("value"), Some(&Value::from("full")));
    assert_eq!(
        harness.reconciler().retained(card).and_then(VNode::view_id),
        Some(card_view)
    );
}

#[test]
fn removal_fires_remove_before_detach_and_removed_after() {
    let mut harness = TestHarness::new();
    let id = mount::<Letters>(&mut harness);
    let views = harness.tree().children(harness.root());
    let log = Rc::new(RefCell::new(Vec::new()));

    for event in [Lifecycle::Remove, Lifecycle::Removed] {
        let log = log.clone();
        let watched = views[0];
        harness
            .reconciler_mut()
            .add_listener(id, event, move |reconciler, _| {
                let attached = reconciler.views().inner().contains(watched);
                log.borrow_mut().push((event, attached));
                Ok(())
            })
            .expect("add listener");
    }

    harness.reconciler_mut().remove(id).expect("remove");
    assert_eq!(
        *log.borrow(),
        vec![(Lifecycle::Remove, true), (Lifecycle::Removed, false)]
    );
    assert!(harness.tree().children(harness.root()).is_empty());
}

#[test]
fn unmount_releases_every_view_and_controller() {
    let mut harness = TestHarness::new();
    let mounted = harness
        .mount(VNode::controller::<Page>())
        .expect("mount page");
    assert!(harness.reconciler().controller_count() >= 2);

    harness.reconciler_mut().unmount(mounted).expect("unmount");
    assert_eq!(harness.reconciler().controller_count(), 0);
    assert_eq!(harness.tree().len(), 1, "only the harness root remains");
}

#[test]
fn element_properties_are_written_after_its_children_attach() {
    let mut harness = TestHarness::new();
    let mounted = harness
        .mount(VNode::element::<Div>().prop("title", "t").child("hello"))
        .expect("mount element");
    let div = harness
        .reconciler()
        .root(mounted)
        .and_then(VNode::view_id)
        .expect("div view");
    let text = harness.tree().children(div)[0];
    let ops = harness.take_ops();

    let position = |op: &ViewOp| ops.iter().position(|seen| seen == op).expect("op logged");
    let created = position(&ViewOp::Create { id: text, name: "TextView" });
    let attached = position(&ViewOp::AppendTo { id: text, parent: div });
    let written = position(&ViewOp::Update { id: div });
    assert!(created < written);
    assert!(attached < written);
    assert_eq!(ops.last(), Some(&ViewOp::AppendTo { id: div, parent: harness.root() }));
}

#[derive(Default, Properties)]
struct Banner;

impl Controller for Banner {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        let banner = VNode::element::<Div>().prop("title", "banner");
        if cx.get("wide") == Some(&Value::Bool(true)) {
            banner.prop("width", 120).into()
        } else {
            banner.into()
        }
    }
}

#[test]
fn dropped_property_keeps_its_live_value() {
    let mut harness = TestHarness::new();
    let id = mount::<Banner>(&mut harness);
    harness
        .reconciler_mut()
        .set_model(id, "wide", true)
        .expect("widen");
    harness.flush().expect("flush");
    let div = harness
        .reconciler()
        .retained(id)
        .and_then(VNode::view_id)
        .expect("banner view");
    let width = |harness: &TestHarness| harness.tree().view::<Div>(div).map(|div| div.width);
    assert_eq!(width(&harness), Some(120));
    harness.take_ops();

    harness
        .reconciler_mut()
        .set_model(id, "wide", false)
        .expect("narrow");
    harness.flush().expect("flush");
    assert_eq!(width(&harness), Some(120));
    assert!(harness.take_ops().is_empty());
    assert_eq!(
        harness.reconciler().retained(id).and_then(VNode::view_id),
        Some(div)
    );
}
