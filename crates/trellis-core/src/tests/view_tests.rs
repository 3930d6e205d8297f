use super::*;

fn text(value: &str) -> Box<dyn View> {
    Box::new(TextView {
        value: value.to_owned(),
    })
}

#[test]
fn removed_views_free_their_storage_for_reuse() {
    let mut tree = MemoryViewTree::new();
    let root = tree.create(Box::new(Placeholder));
    let mut capacity = None;
    for round in 0..4 {
        let rows: Vec<ViewId> = (0..8).map(|_| tree.create(text("row"))).collect();
        for row in &rows {
            tree.append_to(*row, root).expect("attach row");
        }
        let grown = *capacity.get_or_insert(tree.capacity());
        assert_eq!(tree.capacity(), grown, "round {round} reused freed slots");
        for row in rows {
            tree.remove(row).expect("remove row");
        }
        assert_eq!(tree.len(), 1, "round {round} leaves only the root");
    }
}

#[test]
fn stale_ids_do_not_reach_a_reused_slot() {
    let mut tree = MemoryViewTree::new();
    let old = tree.create(text("old"));
    tree.remove(old).expect("remove");
    let new = tree.create(text("new"));

    assert_ne!(old, new);
    assert!(!tree.contains(old));
    assert_eq!(tree.get_mut(old).err(), Some(ReconcileError::MissingView { id: old }));
    assert_eq!(tree.view::<TextView>(new).map(|view| view.value.as_str()), Some("new"));
}

#[test]
fn removal_drops_the_whole_subtree() {
    let mut tree = MemoryViewTree::new();
    let root = tree.create(Box::new(Placeholder));
    let branch = tree.create(Box::new(Placeholder));
    let leaf = tree.create(text("leaf"));
    tree.append_to(branch, root).expect("attach branch");
    tree.append_to(leaf, branch).expect("attach leaf");

    tree.remove(branch).expect("remove branch");
    assert!(!tree.contains(leaf));
    assert!(tree.children(root).is_empty());
    assert_eq!(tree.len(), 1);
}
