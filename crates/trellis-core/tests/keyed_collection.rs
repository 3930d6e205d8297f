use trellis_core::{
    Controller, ControllerId, FromValue, Key, Placeholder, Properties, ReconcileError,
    RenderScope, Rendered, VNode, VNodeKind, ViewId, ViewTree, Warning,
};
use trellis_testing::{TestHarness, ViewOp};

#[derive(Default, Properties)]
struct Items;

impl Controller for Items {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        let read = |name: &str| {
            cx.get(name)
                .and_then(|value| Vec::<String>::from_value(value).ok())
                .unwrap_or_default()
        };
        let items = read("keys")
            .into_iter()
            .zip(read("values"))
            .map(|(key, value)| VNode::text(value).keyed(key));
        VNode::collection(items).into()
    }
}

#[derive(Default, Properties)]
struct Unkeyed;

impl Controller for Unkeyed {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        cx.get("values")
            .and_then(|value| Vec::<String>::from_value(value).ok())
            .unwrap_or_default()
            .into()
    }
}

fn mount_items(harness: &mut TestHarness) -> ControllerId {
    let mounted = harness
        .mount(VNode::controller::<Items>())
        .expect("mount items");
    harness
        .reconciler()
        .root_controller(mounted)
        .expect("items controller")
}

fn show(
    harness: &mut TestHarness,
    id: ControllerId,
    keys: &[&str],
    values: &[&str],
) -> Result<(), ReconcileError> {
    let reconciler = harness.reconciler_mut();
    reconciler.set_model(id, "keys", keys.to_vec())?;
    reconciler.set_model(id, "values", values.to_vec())?;
    harness.flush()
}

fn item_views(harness: &TestHarness, id: ControllerId) -> Vec<ViewId> {
    harness
        .reconciler()
        .retained(id)
        .map(|node| {
            node.children()
                .iter()
                .flatten()
                .filter_map(VNode::view_id)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn changed_item_is_patched_in_place_and_siblings_untouched() {
    let mut harness = TestHarness::new();
    let id = mount_items(&mut harness);
    show(&mut harness, id, &["a", "b", "c"], &["1", "2", "3"]).expect("initial items");
    let before = item_views(&harness, id);
    harness.take_ops();

    show(&mut harness, id, &["a", "b", "c"], &["1", "2*", "3"]).expect("update b");

    assert_eq!(item_views(&harness, id), before);
    assert_eq!(harness.take_ops(), vec![ViewOp::Update { id: before[1] }]);
    let list = harness.reconciler().retained(id).expect("retained list");
    assert_eq!(list.item(&Key::from("b")).and_then(VNode::view_id), Some(before[1]));
    assert!(list.item(&Key::from("q")).is_none());
    assert_eq!(harness.texts(), vec!["1", "2*", "3"]);
}

#[test]
fn reorder_moves_views_without_recreating_them() {
    let mut harness = TestHarness::new();
    let id = mount_items(&mut harness);
    show(&mut harness, id, &["a", "b", "c"], &["1", "2", "3"]).expect("initial items");
    let before = item_views(&harness, id);
    harness.take_ops();

    show(&mut harness, id, &["c", "a", "b"], &["3", "1", "2"]).expect("reorder");

    let ops = harness.take_ops();
    assert!(ops.iter().all(ViewOp::is_move), "only moves expected: {ops:?}");
    assert!(!ops.is_empty());
    assert_eq!(item_views(&harness, id), vec![before[2], before[0], before[1]]);
    assert_eq!(harness.tree().children(harness.root()), vec![before[2], before[0], before[1]]);
    assert_eq!(harness.texts(), vec!["3", "1", "2"]);
}

#[test]
fn duplicate_keys_fail_before_any_mutation() {
    let mut harness = TestHarness::new();
    let id = mount_items(&mut harness);
    show(&mut harness, id, &["a", "b"], &["1", "2"]).expect("initial items");
    harness.take_ops();

    let err = show(&mut harness, id, &["a", "a"], &["1", "2"]).expect_err("duplicate key");
    assert_eq!(err, ReconcileError::DuplicateKey { key: Key::from("a") });
    assert!(harness.take_ops().is_empty());
    assert_eq!(harness.texts(), vec!["1", "2"]);
}

#[test]
fn dropped_keys_are_removed_and_new_keys_created() {
    let mut harness = TestHarness::new();
    let id = mount_items(&mut harness);
    show(&mut harness, id, &["a", "b", "c"], &["1", "2", "3"]).expect("initial items");
    let before = item_views(&harness, id);
    harness.take_ops();

    show(&mut harness, id, &["a", "d"], &["1", "4"]).expect("replace tail");

    let ops = harness.take_ops();
    assert!(ops.contains(&ViewOp::Remove { id: before[1] }));
    assert!(ops.contains(&ViewOp::Remove { id: before[2] }));
    assert_eq!(ops.iter().filter(|op| op.is_create()).count(), 1);
    assert!(!ops.contains(&ViewOp::Update { id: before[0] }));
    assert_eq!(item_views(&harness, id)[0], before[0]);
    assert_eq!(harness.texts(), vec!["1", "4"]);
}

#[test]
fn empty_collection_keeps_exactly_one_placeholder() {
    let mut harness = TestHarness::new();
    let id = mount_items(&mut harness);
    let root = harness.root();

    let children = harness.tree().children(root);
    assert_eq!(children.len(), 1);
    let holder = children[0];
    assert!(harness.tree().view::<Placeholder>(holder).is_some());

    show(&mut harness, id, &["a", "b"], &["1", "2"]).expect("fill");
    assert!(!harness.tree().contains(holder));
    assert_eq!(harness.tree().children(root).len(), 2);

    show(&mut harness, id, &[], &[]).expect("empty again");
    let children = harness.tree().children(root);
    assert_eq!(children.len(), 1);
    assert!(harness.tree().view::<Placeholder>(children[0]).is_some());
    assert!(harness.texts().is_empty());

    show(&mut harness, id, &["z"], &["26"]).expect("refill");
    assert_eq!(harness.texts(), vec!["26"]);
    assert_eq!(harness.tree().children(root).len(), 1);
}

#[test]
fn unkeyed_items_match_by_position_and_warn_once() {
    let mut harness = TestHarness::new();
    let mounted = harness
        .mount(VNode::controller::<Unkeyed>())
        .expect("mount unkeyed");
    let id = harness
        .reconciler()
        .root_controller(mounted)
        .expect("unkeyed controller");

    harness
        .reconciler_mut()
        .set_model(id, "values", vec!["1", "2"])
        .expect("values");
    harness.flush().expect("flush");
    assert!(harness.reconciler().runtime().has_warned(Warning::UndefinedKey));
    harness.take_ops();

    harness
        .reconciler_mut()
        .set_model(id, "values", vec!["2", "1"])
        .expect("swap");
    harness.flush().expect("flush");

    let ops = harness.take_ops();
    assert_eq!(ops.iter().filter(|op| op.is_update()).count(), 2);
    assert!(!ops.iter().any(|op| op.is_create() || op.is_remove()));
    assert_eq!(harness.texts(), vec!["2", "1"]);
}

#[derive(Default, Properties)]
struct MixedKeys;

impl Controller for MixedKeys {
    fn render(&mut self, _cx: &RenderScope<'_>) -> Rendered {
        VNode::collection([
            VNode::text("one").keyed(1_i64),
            VNode::text("uno").keyed("1"),
        ])
        .into()
    }
}

#[test]
fn numeric_and_text_keys_with_the_same_text_collide() {
    let mut harness = TestHarness::new();
    let err = harness
        .mount(VNode::controller::<MixedKeys>())
        .expect_err("same key twice");
    assert_eq!(err, ReconcileError::DuplicateKey { key: Key::from(1) });
    assert_eq!(Key::from(1), Key::from("1"));
}

#[derive(Default, Properties)]
struct Sparse;

impl Controller for Sparse {
    fn render(&mut self, _cx: &RenderScope<'_>) -> Rendered {
        VNode::new(
            VNodeKind::Collection,
            [],
            vec![None, Some(VNode::text("kept").keyed("k")), None],
        )
        .into()
    }
}

#[test]
fn empty_collection_slots_are_dropped_without_a_key_warning() {
    let mut harness = TestHarness::new();
    let mounted = harness
        .mount(VNode::controller::<Sparse>())
        .expect("mount sparse");
    let id = harness
        .reconciler()
        .root_controller(mounted)
        .expect("sparse controller");

    let list = harness.reconciler().retained(id).expect("collection");
    assert_eq!(list.children().len(), 1);
    assert!(list.item(&Key::from("k")).is_some());
    assert_eq!(harness.texts(), vec!["kept"]);
    assert!(!harness.reconciler().runtime().has_warned(Warning::UndefinedKey));
}

#[derive(Default, Properties)]
struct Badge {
    #[prop]
    name: String,
}

impl Controller for Badge {
    fn render(&mut self, _cx: &RenderScope<'_>) -> Rendered {
        self.name.clone().into()
    }
}

#[derive(Default, Properties)]
struct Roster;

impl Controller for Roster {
    fn render(&mut self, cx: &RenderScope<'_>) -> Rendered {
        let names = cx
            .get("names")
            .and_then(|value| Vec::<String>::from_value(value).ok())
            .unwrap_or_default();
        VNode::collection(
            names
                .into_iter()
                .map(|name| VNode::controller::<Badge>().key(name.clone()).prop("name", name)),
        )
        .into()
    }
}

#[test]
fn removed_item_controller_is_recreated_on_the_next_diff() {
    let mut harness = TestHarness::new();
    let mounted = harness
        .mount(VNode::controller::<Roster>())
        .expect("mount roster");
    let roster = harness
        .reconciler()
        .root_controller(mounted)
        .expect("roster controller");
    harness
        .reconciler_mut()
        .set_model(roster, "names", vec!["a", "b", "c"])
        .expect("names");
    harness.flush().expect("flush");

    let badge = |harness: &TestHarness, key: &str| {
        harness
            .reconciler()
            .retained(roster)
            .and_then(|list| list.item(&Key::from(key)))
            .and_then(VNode::controller_id)
            .expect("badge controller")
    };
    let removed = badge(&harness, "b");
    let kept = badge(&harness, "a");
    harness.reconciler_mut().remove(removed).expect("remove badge");
    assert_eq!(harness.texts(), vec!["a", "c"]);

    harness
        .reconciler_mut()
        .set_model(roster, "names", vec!["a", "b", "c", "d"])
        .expect("grow");
    harness.flush().expect("flush");

    assert_eq!(harness.texts(), vec!["a", "b", "c", "d"]);
    assert_ne!(badge(&harness, "b"), removed);
    assert_eq!(badge(&harness, "a"), kept);
}
