use super::*;
use crate as trellis_core;
use crate::fingerprint::{combine, property, HOLE};

#[derive(Default, Properties)]
struct Frame {
    #[prop]
    width: i64,
    #[prop]
    title: String,
}

impl View for Frame {}

#[derive(Default, Properties)]
struct Panel {
    #[prop]
    width: i64,
}

impl View for Panel {}

fn frame(width: i64) -> NodeBuilder {
    VNode::element::<Frame>().prop("width", width)
}

#[test]
fn combine_is_times_33_plus() {
    assert_eq!(combine(0, 7), 7);
    assert_eq!(combine(1, 0), 33);
    assert_eq!(combine(2, 5), 71);
    assert_eq!(combine(u64::MAX, 1), u64::MAX.wrapping_mul(33).wrapping_add(1));
}

#[test]
fn property_fingerprint_depends_on_name_and_value() {
    assert_eq!(property("width", &1i64), property("width", &1i64));
    assert_ne!(property("width", &1i64), property("height", &1i64));
    assert_ne!(property("width", &1i64), property("width", &2i64));
}

#[test]
fn structurally_equal_nodes_share_a_fingerprint() {
    let a = frame(10).child(VNode::text("a")).build();
    let b = frame(10).child(VNode::text("a")).build();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.props_fingerprint(), b.props_fingerprint());
}

#[test]
fn changing_a_descendant_changes_every_ancestor() {
    let leaf = |text: &str| frame(1).child(VNode::text(text));
    let a = frame(0).child(frame(2).child(leaf("x"))).build();
    let b = frame(0).child(frame(2).child(leaf("y"))).build();
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.props_fingerprint(), b.props_fingerprint());

    let inner_a = a.children()[0].as_ref().expect("inner child");
    let inner_b = b.children()[0].as_ref().expect("inner child");
    assert_ne!(inner_a.fingerprint(), inner_b.fingerprint());
}

#[test]
fn type_participates_in_fingerprint() {
    let frame = VNode::element::<Frame>().prop("width", 3).build();
    let panel = VNode::element::<Panel>().prop("width", 3).build();
    assert_eq!(frame.props_fingerprint(), panel.props_fingerprint());
    assert_ne!(frame.fingerprint(), panel.fingerprint());
}

#[test]
fn property_order_matters() {
    let a = VNode::element::<Frame>()
        .prop("width", 1)
        .prop("title", "t")
        .build();
    let b = VNode::element::<Frame>()
        .prop("title", "t")
        .prop("width", 1)
        .build();
    assert_ne!(a.props_fingerprint(), b.props_fingerprint());
}

#[test]
fn empty_child_slots_are_counted() {
    let with_hole = frame(0).child(()).child(VNode::text("a")).build();
    let without = frame(0).child(VNode::text("a")).build();
    assert_ne!(with_hole.fingerprint(), without.fingerprint());

    let expected = combine(
        combine(
            fingerprint::node(
                hash_one(&std::any::TypeId::of::<Frame>()),
                without.props_fingerprint(),
            ),
            HOLE,
        ),
        VNode::text("a").fingerprint(),
    );
    assert_eq!(with_hole.fingerprint(), expected);
}

#[test]
fn float_values_hash_by_bits() {
    let a = Value::Float(0.5);
    let b = Value::Float(0.5);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(Value::Float(1.0).fingerprint(), Value::Int(1).fingerprint());
}
