use std::ops::{ControlFlow, Range as IndexRange};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn keys<C>(tree: &AvlTree<TestNode, C>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn insert_find_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.get(key).expect("item not found");
        assert_eq!(node.key(), key);
    }

    assert_eq!(tree.len(), keys.len());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

// Calls `f` with every permutation of `0..n`.
fn for_each_permutation(n: u32, mut f: impl FnMut(&[u32])) {
    fn permute(prefix: &mut Vec<u32>, rest: &mut Vec<u32>, f: &mut dyn FnMut(&[u32])) {
        if rest.is_empty() {
            f(prefix);
            return;
        }

        for i in 0..rest.len() {
            let item = rest.remove(i);
            prefix.push(item);
            permute(prefix, rest, f);
            prefix.pop();
            rest.insert(i, item);
        }
    }

    permute(&mut Vec::new(), &mut (0..n).collect(), &mut f);
}

#[test]
fn four_elems_find() {
    for_each_permutation(4, insert_find_all);
}

#[test]
fn five_elems_find() {
    for_each_permutation(5, insert_find_all);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.remove(key).expect("item not found");
        assert_eq!(node.key, *key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert!(tree.root().is_none());

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    for_each_permutation(3, insert_remove_all);
}

#[test]
fn remove_four() {
    for_each_permutation(4, insert_remove_all);
}

#[test]
fn remove_six() {
    for_each_permutation(6, insert_remove_all);
}

#[test]
fn removed_node_is_detached() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..7 {
        tree.insert(TestNode::new(key));
    }

    // 3 is the root and has two children.
    let removed = tree.remove(&3).unwrap();
    assert_eq!(next(&*removed).map(|n| n.key), None);
    assert_eq!(prev(&*removed).map(|n| n.key), None);
    assert_eq!(removed.links.balance(), 0);
    tree.assert_invariants();
}

#[test]
fn left_chain_single_rotation() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [3, 2, 1] {
        tree.insert(TestNode::new(key));
    }

    tree.assert_invariants();
    assert_eq!(tree.height(), 2);

    let root = tree.root().unwrap();
    assert_eq!(root.key, 2);
    assert_eq!(unsafe { links(NonNull::from(root)).left().unwrap().as_ref() }.key, 1);
    assert_eq!(unsafe { links(NonNull::from(root)).right().unwrap().as_ref() }.key, 3);
}

#[test]
fn zigzag_double_rotation() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [3, 1, 2] {
        tree.insert(TestNode::new(key));
    }

    tree.assert_invariants();
    assert_eq!(tree.root().unwrap().key, 2);
    assert_eq!(keys(&tree), [1, 2, 3]);

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [1, 3, 2] {
        tree.insert(TestNode::new(key));
    }

    tree.assert_invariants();
    assert_eq!(tree.root().unwrap().key, 2);
}

#[test]
fn rotation_without_child_is_not_applicable() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.insert(TestNode::new(1));

    let root = tree.root.unwrap();
    unsafe {
        assert!(tree.rotate(root, Dir::Left).is_none());
        assert!(tree.rotate(root, Dir::Right).is_none());
    }

    assert_eq!(tree.root, Some(root));
    tree.assert_invariants();
}

#[test]
fn rotated_balances_match_measured_heights() {
    // Before a left rotation, `down` holds a subtree of height `c` on the left and `up` on the
    // right; `up` holds `across` (height `b`) on the left and `outer` (height `a`) on the right.
    for down in -2..=1i8 {
        for up in -1..=1i8 {
            let (b, a) = if up >= 0 { (2 + up, 2) } else { (2, 2 - up) };
            let c = down + 1 + b.max(a);

            let (new_down, new_up) = rotated_balances(Dir::Left, down, up);
            assert_eq!(new_down, c - b, "down={down} up={up}");
            assert_eq!(new_up, 1 + c.max(b) - a, "down={down} up={up}");

            let (mirror_down, mirror_up) = rotated_balances(Dir::Right, -down, -up);
            assert_eq!((mirror_down, mirror_up), (-new_down, -new_up));
        }
    }
}

#[test]
fn delete_rebalances_multiple_levels() {
    let mut map = AvlMap::new();
    for key in 1..=7 {
        map.insert(key, ());
    }

    assert_eq!(map.remove(&1), Some(()));
    map.assert_invariants();
    assert!(map.is_balanced());
    assert_eq!(map.min_key(), Some(&2));
}

#[test]
fn delete_cascades_to_root() {
    // Every node of this tree leans left. Removing 12 rotates at 11 and again at the root.
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [8, 5, 11, 3, 7, 10, 12, 2, 4, 6, 9, 1] {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    assert_eq!(tree.root().unwrap().key, 8);
    assert_eq!(tree.height(), 5);

    tree.remove(&12).unwrap();
    tree.assert_invariants();
    assert_eq!(tree.root().unwrap().key, 5);
    assert_eq!(tree.height(), 4);
    assert_eq!(keys(&tree), (1..=11).collect::<Vec<_>>());
}

#[test]
fn range_visits_inclusive_bounds() {
    let mut map = AvlMap::new();
    for key in [5, 1, 9, 3, 7] {
        map.insert(key, ());
    }

    let mut visited = Vec::new();
    let stopped = map.visit_range(&3, &7, |key, _| {
        visited.push(*key);
        ControlFlow::<()>::Continue(())
    });

    assert_eq!(stopped, None);
    assert_eq!(visited, [3, 5, 7]);
}

#[test]
fn range_stops_early() {
    let map: AvlMap<u32, u32> = (0..100).map(|k| (k, k * 2)).collect();

    let mut visited = Vec::new();
    let found = map.visit_range(&10, &90, |key, value| {
        visited.push(*key);
        if *value >= 30 {
            ControlFlow::Break(*key)
        } else {
            ControlFlow::Continue(())
        }
    });

    assert_eq!(found, Some(15));
    assert_eq!(visited, (10..=15).collect::<Vec<_>>());
}

#[test]
fn range_outside_keys_is_empty() {
    let map: AvlMap<u32, ()> = [10, 20, 30].into_iter().map(|k| (k, ())).collect();

    assert_eq!(map.range(&0, &5).count(), 0);
    assert_eq!(map.range(&31, &40).count(), 0);
    assert_eq!(map.range(&11, &19).count(), 0);
    assert_eq!(map.range(&20, &10).count(), 0);
    assert_eq!(map.range(&20, &20).map(|(k, _)| *k).collect::<Vec<_>>(), [20]);
}

#[test]
fn visit_stops_early() {
    let map: AvlMap<u32, ()> = (0..10).map(|k| (k, ())).collect();

    let mut count = 0;
    let found = map.visit(|key, _| {
        count += 1;
        if *key == 4 {
            ControlFlow::Break("four")
        } else {
            ControlFlow::Continue(())
        }
    });

    assert_eq!(found, Some("four"));
    assert_eq!(count, 5);
}

#[test]
fn reject_duplicates_updates_value() {
    let mut map = AvlMap::with_duplicates(Duplicates::Reject);

    assert_eq!(map.insert("a", 1), None);
    assert_eq!(map.insert("a", 2), Some(1));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&"a"), Some(&2));
    map.assert_invariants();
}

#[test]
fn reject_duplicates_keeps_shape() {
    let mut tree: AvlTree<TestNode> = AvlTree::with_duplicates(Duplicates::Reject);
    for key in 0..15 {
        tree.insert(TestNode::with_id(key, 0));
    }

    let root_key = tree.root().unwrap().key;
    let old = tree.insert(TestNode::with_id(root_key, 1)).unwrap();
    assert_eq!((old.key, old.id), (root_key, 0));

    let root = tree.root().unwrap();
    assert_eq!((root.key, root.id), (root_key, 1));
    assert_eq!(tree.len(), 15);
    tree.assert_invariants();
}

#[test]
fn allowed_duplicates_insert_before_equal_keys() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for (id, key) in [2, 1, 2, 3, 2, 2].into_iter().enumerate() {
        tree.insert(TestNode::with_id(key, id as u32));
        tree.assert_invariants();
    }

    let order: Vec<_> = tree.iter().map(|node| (node.key, node.id)).collect();
    assert_eq!(order, [(1, 1), (2, 5), (2, 4), (2, 2), (2, 0), (3, 3)]);
}

#[test]
fn allowed_duplicates_count_separately() {
    let mut map = AvlMap::new();
    map.insert(1, 'a');
    map.insert(1, 'b');
    map.insert(1, 'c');

    assert_eq!(map.len(), 3);
    assert!(map.contains_key(&1));
    assert_eq!(map.values().copied().collect::<String>(), "cba");

    assert!(map.remove(&1).is_some());
    assert!(map.remove(&1).is_some());
    assert!(map.remove(&1).is_some());
    assert!(map.remove(&1).is_none());
    assert!(map.is_empty());
}

#[test]
fn custom_comparator_orders_keys() {
    let mut map = AvlMap::with_comparator(
        |a: &String, b: &String| a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        Duplicates::Reject,
    );

    for word in ["pear", "fig", "banana", "kiwi", "apple"] {
        map.insert(word.to_string(), word.len());
    }

    let words: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(words, ["fig", "kiwi", "pear", "apple", "banana"]);
    assert_eq!(map.get(&"kiwi".to_string()), Some(&4));
    assert!(!map.contains_key(&"plum".to_string()));
    map.assert_invariants();
}

#[test]
fn shift_and_pop() {
    let mut map: AvlMap<u32, char> = [(2, 'b'), (1, 'a'), (3, 'c')].into_iter().collect();

    assert_eq!(map.pop_first(), Some((1, 'a')));
    assert_eq!(map.pop_last(), Some((3, 'c')));
    assert_eq!(map.pop_last(), Some((2, 'b')));
    assert_eq!(map.pop_first(), None);
    assert_eq!(map.pop_last(), None);
    assert_eq!(map.min_key(), None);
    assert_eq!(map.max_key(), None);
}

#[test]
fn at_returns_in_order_position() {
    let map: AvlMap<u32, ()> = [40, 10, 30, 20].into_iter().map(|k| (k, ())).collect();

    assert_eq!(map.at(0).map(|n| *n.key()), Some(10));
    assert_eq!(map.at(3).map(|n| *n.key()), Some(40));
    assert!(map.at(4).is_none());
}

#[test]
fn node_navigation() {
    let map: AvlMap<u32, u32> = (0..32).map(|k| (k * 2, k)).collect();

    let mut forward = Vec::new();
    let mut cur = map.min_node();
    while let Some(node) = cur {
        forward.push(*node.key());
        cur = node.next();
    }
    assert_eq!(forward, (0..32).map(|k| k * 2).collect::<Vec<_>>());

    let mut backward = Vec::new();
    let mut cur = map.max_node();
    while let Some(node) = cur {
        backward.push(*node.value());
        cur = node.prev();
    }
    assert_eq!(backward, (0..32).rev().collect::<Vec<_>>());

    let root = map.root_node().unwrap();
    assert_eq!(root.next().map(|n| *n.key()), Some(root.key() + 2));
    assert_eq!(root.prev().map(|n| *n.key()), Some(root.key() - 2));
}

#[test]
fn load_builds_minimal_tree() {
    let mut map = AvlMap::new();
    map.load(0..10u32, (0..10u32).map(|k| k * k), false).unwrap();

    map.assert_invariants();
    assert_eq!(map.len(), 10);
    assert_eq!(map.height(), 4);
    assert_eq!(map.get(&7), Some(&49));
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());

    // The bulk-loaded tree is a regular tree afterwards.
    map.insert(10, 100);
    map.remove(&0);
    map.assert_invariants();
}

#[test]
fn load_presorts() {
    let mut map = AvlMap::new();
    map.load([3, 1, 2], ['c', 'a', 'b'], true).unwrap();

    map.assert_invariants();
    assert_eq!(map.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(), [
        (1, 'a'),
        (2, 'b'),
        (3, 'c')
    ]);
}

#[test]
fn load_rejects_non_empty_tree() {
    let mut map = AvlMap::new();
    map.insert(1, 1);

    let err = map.load([2, 3], [2, 3], false).unwrap_err();
    assert_eq!(err, LoadError::NotEmpty { len: 1 });
    assert_eq!(map.len(), 1);

    map.clear();
    assert!(map.load([2, 3], [2, 3], false).is_ok());
}

#[test]
fn tree_load_into_non_empty_tree_leaves_it_untouched() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.insert(TestNode::new(1));

    let err = tree
        .load(vec![TestNode::new(5), TestNode::new(6)], false)
        .unwrap_err();

    assert_eq!(err, LoadError::NotEmpty { len: 1 });
    assert_eq!(keys(&tree), [1]);
    tree.assert_invariants();
}

#[test]
fn load_rejects_length_mismatch() {
    let mut map: AvlMap<u32, u32> = AvlMap::new();

    let err = map.load([1, 2, 3], [1, 2], false).unwrap_err();
    assert_eq!(err, LoadError::LengthMismatch { keys: 3, values: 2 });
    assert!(map.is_empty());
    assert_eq!(
        err.to_string(),
        "cannot pair 3 keys with 2 values for a bulk load"
    );
}

#[test]
fn load_empty() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.load(Vec::new(), false).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
}

#[test]
fn clear_and_reuse() {
    let mut map: AvlMap<u32, String> = (0..50).map(|k| (k, k.to_string())).collect();

    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.iter().count(), 0);

    map.insert(5, "five".to_string());
    assert_eq!(map.get(&5).map(String::as_str), Some("five"));
}

#[test]
fn get_mut_updates_value() {
    let mut map: AvlMap<u32, u32> = (0..5).map(|k| (k, 0)).collect();

    *map.get_mut(&3).unwrap() += 7;
    assert_eq!(map.get(&3), Some(&7));
    assert!(map.get_mut(&9).is_none());
}

#[test]
fn is_balanced_detects_skew() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..3 {
        tree.insert(TestNode::new(key));
    }
    assert!(tree.is_balanced());

    // Move the left leaf below the right leaf, leaving the root two levels right-heavy.
    unsafe {
        let root = tree.root.unwrap();
        let left = links(root).left().unwrap();
        let right = links(root).right().unwrap();

        links(root).set_left(None);
        links(right).set_left(Some(left));
        links(left).set_parent(Some(right));

        assert!(!tree.is_balanced());

        links(right).set_left(None);
        links(root).set_left(Some(left));
        links(left).set_parent(Some(root));
    }

    assert!(tree.is_balanced());
    tree.assert_invariants();
}

#[test]
fn render_draws_shape() {
    let mut map = AvlMap::new();
    for key in [2, 1, 3] {
        map.insert(key, ());
    }

    assert_eq!(map.to_string(), "└── 2\n    ├── 1\n    └── 3\n");
    assert_eq!(map.render(|k, _| k * 10), "└── 20\n    ├── 10\n    └── 30\n");

    map.insert(4, ());
    assert_eq!(
        map.to_string(),
        "└── 2\n    ├── 1\n    └── 3\n        ├── ∅\n        └── 4\n"
    );

    map.remove(&4);
    map.insert(0, ());
    assert_eq!(
        map.to_string(),
        "└── 2\n    ├── 1\n    │   ├── 0\n    │   └── ∅\n    └── 3\n"
    );

    assert_eq!(AvlMap::<u32, ()>::new().to_string(), "");
}

#[test]
fn dotgraph_labels_balance() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [2, 1] {
        tree.insert(TestNode::new(key));
    }

    let mut out = String::new();
    tree.dotgraph("t", |node| node.key, &mut out).unwrap();

    assert!(out.starts_with("digraph \"graph-t\""));
    assert!(out.contains("[label=\"2:1\"]"));
    assert!(out.contains("[label=\"1:0\"]"));
}

#[test]
fn cursor_walks_and_removes() {
    let mut tree: AvlTree<TestNode> = AvlTree::with_duplicates(Duplicates::Reject);
    for key in 0..10 {
        tree.insert(TestNode::new(key));
    }

    {
        let mut curs = tree.cursor_last();
        assert_eq!(curs.get().map(|n| n.key), Some(9));
        curs.move_next();
        assert!(curs.get().is_none());
        assert_eq!(curs.peek_next().map(|n| n.key), Some(0));
        assert_eq!(curs.peek_prev().map(|n| n.key), Some(9));
    }

    let mut curs = tree.cursor_first_mut();
    while let Some(node) = curs.get() {
        if node.key % 2 == 0 {
            curs.remove_current();
        } else {
            curs.move_next();
        }
    }
    drop(curs);

    tree.assert_invariants();
    assert_eq!(keys(&tree), [1, 3, 5, 7, 9]);
}

#[test]
fn debug_lists_keys() {
    let map: AvlMap<u32, char> = [(2, 'b'), (1, 'a')].into_iter().collect();
    assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b'}");

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.insert(TestNode::new(4));
    assert_eq!(format!("{tree:?}"), "{4}");
}

#[test]
fn map_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AvlMap<u32, String>>();
}

#[test]
fn shared_map_behind_mutex() {
    use std::sync::{Arc, Mutex};

    let map = Arc::new(Mutex::new(AvlMap::with_duplicates(Duplicates::Reject)));

    let workers: Vec<_> = (0..4u32)
        .map(|t| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                for key in (t * 100)..(t * 100 + 100) {
                    map.lock().unwrap().insert(key, t);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let map = map.lock().unwrap();
    map.assert_invariants();
    assert_eq!(map.len(), 400);
    assert_eq!(map.get(&250), Some(&2));
}

#[test]
fn intrusive_tree_moves_across_threads() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..32 {
        tree.insert(TestNode::new(key));
    }

    let tree = std::thread::spawn(move || {
        tree.remove(&7);
        tree
    })
    .join()
    .unwrap();

    tree.assert_invariants();
    assert_eq!(tree.len(), 31);
    assert!(!tree.contains_key(&7));
}

#[cfg(miri)]
const FUZZ_RANGE: IndexRange<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: IndexRange<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn duplicates_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_duplicates_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        values in proptest::collection::vec(0u32..500, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(values, ops);
    }

    #[test]
    fn load_equivalence(keys in proptest::collection::vec(any::<u32>(), 0..300)) {
        model::run_load_equivalence(keys);
    }

    #[test]
    fn insert_then_remove_all_empties(keys in proptest::collection::hash_set(any::<u32>(), 0..200), seed in any::<u64>()) {
        let mut keys: Vec<u32> = keys.into_iter().collect();
        let mut map = AvlMap::with_duplicates(Duplicates::Reject);
        for &key in &keys {
            map.insert(key, key);
        }

        // Remove in a shuffled order derived from `seed`.
        keys.sort_by_key(|&k| (u64::from(k) ^ seed).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        for key in &keys {
            prop_assert_eq!(map.remove(key), Some(*key));
            map.assert_invariants();
        }

        prop_assert!(map.is_empty());
        prop_assert!(map.root_node().is_none());
    }
}

#[test]
fn keys_are_sorted_for_any_insert_order() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let mut expected = vec![];
    let mut x = 17u32;
    for _ in 0..500 {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345) % 1000;
        tree.insert(TestNode::new(x));
        expected.push(x);
    }

    expected.sort_unstable();
    tree.assert_invariants();
    assert_eq!(keys(&tree), expected);
}
