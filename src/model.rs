use std::{collections::BTreeMap, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlMap, AvlTree, Duplicates, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    pub id: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        TestNode::with_id(key, 0)
    }

    pub fn with_id(key: u32, id: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
            id,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    Range(ItemValue, ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::Get(item) => FinalOp::Get(get_value(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(sorted, item)),
            Op::Range(low, high) => {
                let (low, high) = (get_value(sorted, low), get_value(sorted, high));
                FinalOp::Range(low.min(high), low.max(high))
            }
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Remove(u32),
    Range(u32, u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
        (value_strategy(), value_strategy()).prop_map(|(low, high)| Op::Range(low, high)),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

fn insert_sorted(v: &mut Vec<u32>, value: u32) {
    if let Err(idx) = v.binary_search(&value) {
        v.insert(idx, value);
    }
}

fn remove_sorted(v: &mut Vec<u32>, value: u32) {
    if let Ok(idx) = v.binary_search(&value) {
        v.remove(idx);
    }
}

/// Runs `ops` against an [`AvlMap`] that rejects duplicates and a `BTreeMap`, checking that both
/// agree after every operation.
pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_values = Vec::with_capacity(ops.len());
    let mut btree = BTreeMap::new();
    let mut avl = AvlMap::with_duplicates(Duplicates::Reject);

    for (op_id, (op, value)) in ops.into_iter().zip(0u32..).enumerate() {
        let final_op = op.finalize(&sorted_values);

        match final_op {
            FinalOp::Insert(key) => {
                insert_sorted(&mut sorted_values, key);

                let from_btree = btree.insert(key, value);
                let from_avl = avl.insert(key, value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                let from_btree = btree.get(&key);
                let from_avl = avl.get(&key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
                assert_eq!(btree.contains_key(&key), avl.contains_key(&key));
            }

            FinalOp::Remove(key) => {
                remove_sorted(&mut sorted_values, key);

                let from_btree = btree.remove(&key);
                let from_avl = avl.remove(&key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Range(low, high) => {
                let from_btree: Vec<_> = btree.range(low..=high).collect();
                let from_avl: Vec<_> = avl.range(&low, &high).collect();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value();
                let from_avl = avl.first_key_value();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first();

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_values, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value();
                let from_avl = avl.last_key_value();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last();

                if let Some((key, _)) = from_btree {
                    remove_sorted(&mut sorted_values, key);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert!(avl.is_balanced());
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().eq(avl.iter()));
    }
}

/// Runs `ops` against an [`AvlTree`] that allows duplicates and a sorted `Vec` of keys, checking
/// that both hold the same multiset of keys in the same order after every operation.
pub fn run_duplicates_equivalence(ops: Vec<Op>) {
    let mut model: Vec<u32> = Vec::with_capacity(ops.len());
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    fn key(node: &TestNode) -> u32 {
        node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&model);

        match final_op {
            FinalOp::Insert(value) => {
                let idx = model.partition_point(|&k| k < value);
                model.insert(idx, value);

                assert!(avl.insert(TestNode::new(value)).is_none());
            }

            FinalOp::Get(value) => {
                let from_model = model.binary_search(&value).is_ok();
                let from_avl = avl.get(&value).map(key);

                assert_eq!(from_model, from_avl.is_some(), "FinalOp #{op_id}: {final_op:?}");
                if let Some(found) = from_avl {
                    assert_eq!(found, value);
                }
            }

            FinalOp::Remove(value) => {
                let from_model = model.binary_search(&value).ok().map(|idx| model.remove(idx));
                let from_avl = avl.remove(&value).map(|node| node.key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Range(low, high) => {
                let from_model: Vec<u32> = model
                    .iter()
                    .copied()
                    .filter(|k| (low..=high).contains(k))
                    .collect();
                let from_avl: Vec<u32> = avl.range(&low, &high).map(key).collect();

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                assert_eq!(model.first().copied(), avl.first().map(key));
            }

            FinalOp::PopFirst => {
                let from_model = (!model.is_empty()).then(|| model.remove(0));
                let from_avl = avl.pop_first().map(|node| node.key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                assert_eq!(model.last().copied(), avl.last().map(key));
            }

            FinalOp::PopLast => {
                let from_model = model.pop();
                let from_avl = avl.pop_last().map(|node| node.key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(model.len(), avl.len());
        assert!(model.iter().copied().eq(avl.iter().map(key)));
    }
}

/// Checks that bulk loading `keys` produces the same sequence as inserting them one by one, and a
/// tree of minimal height.
pub fn run_load_equivalence(keys: Vec<u32>) {
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    sorted.dedup();

    let mut inserted = AvlMap::with_duplicates(Duplicates::Reject);
    for &key in &sorted {
        inserted.insert(key, key.wrapping_mul(3));
    }

    let mut loaded = AvlMap::with_duplicates(Duplicates::Reject);
    loaded
        .load(sorted.iter().copied(), sorted.iter().map(|k| k.wrapping_mul(3)), false)
        .expect("empty map must accept a bulk load");
    loaded.assert_invariants();
    assert!(inserted.iter().eq(loaded.iter()));

    // A height-minimal tree of `n` nodes has `ceil(log2(n + 1))` levels.
    let minimal = (usize::BITS - sorted.len().leading_zeros()) as usize;
    assert_eq!(loaded.height(), minimal);

    // The same pairs in arbitrary order must come out sorted with `presort`.
    let mut unique = Vec::with_capacity(keys.len());
    for &key in &keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }

    let mut presorted = AvlMap::with_duplicates(Duplicates::Reject);
    presorted
        .load(unique.iter().copied(), unique.iter().map(|k| k.wrapping_mul(3)), true)
        .expect("empty map must accept a bulk load");
    presorted.assert_invariants();
    assert!(inserted.iter().eq(presorted.iter()));
}

#[derive(Clone, Debug, Arbitrary)]
pub enum CursorOp {
    // Get is not an operation as it's executed on every loop iteration to check equivalence.
    MovePrev,
    MoveNext,
    PeekNext,
    PeekPrev,
    RemoveCurrent,
    RemoveCurrentMovePrev,
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    proptest::prop_oneof![
        Just(CursorOp::MovePrev),
        Just(CursorOp::MoveNext),
        Just(CursorOp::PeekNext),
        Just(CursorOp::PeekPrev),
        Just(CursorOp::RemoveCurrent),
        Just(CursorOp::RemoveCurrentMovePrev),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub values: Vec<u32>,
    pub ops: Vec<CursorOp>,
}

impl<'a> arbitrary::Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        fn value(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u32::arbitrary(u).unwrap_or(0)
        }

        fn op(u: &mut arbitrary::Unstructured<'_>) -> CursorOp {
            CursorOp::arbitrary(u).unwrap_or(CursorOp::MoveNext)
        }

        let num_values = u8::arbitrary(u)? % 100;
        let num_ops = u16::arbitrary(u)? % 1000;

        let values = core::iter::repeat_with(|| value(u))
            .take(num_values.into())
            .collect();

        let ops = core::iter::repeat_with(|| op(u))
            .take(num_ops.into())
            .collect();

        Ok(CursorEquivalenceInput { values, ops })
    }
}

pub fn run_cursor_equivalence(mut values: Vec<u32>, ops: Vec<CursorOp>) {
    values.sort_unstable();
    values.dedup();

    // Ideally this would be a BTreeMap cursor or even a LinkedList cursor, but neither is stable :(
    let mut vec = Vec::new();
    let mut avl: AvlTree<TestNode> = AvlTree::with_duplicates(Duplicates::Reject);

    for val in values {
        vec.push(val);
        avl.insert(TestNode::new(val));
    }

    fn vec_curs_prev(v: &[u32], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_sub(1),
            None => v.len().checked_sub(1),
        }
    }

    fn vec_curs_next(v: &[u32], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_add(1).filter(|&i| i < v.len()),
            None => (!v.is_empty()).then_some(0),
        }
    }

    let mut vec_curs = vec_curs_next(&vec, None);
    let mut avl_curs = avl.cursor_first_mut();

    // Check that the initial states are equivalent.
    {
        let v = vec_curs.map(|i| &vec[i]);
        let w = avl_curs.get().map(TestNode::key);

        assert_eq!(v, w);
    }

    for op in ops {
        match op {
            CursorOp::MoveNext => {
                vec_curs = vec_curs_next(&vec, vec_curs);
                avl_curs.move_next();
            }

            CursorOp::MovePrev => {
                vec_curs = vec_curs_prev(&vec, vec_curs);
                avl_curs.move_prev();
            }

            CursorOp::PeekNext => {
                let v = vec_curs_next(&vec, vec_curs).map(|i| &vec[i]);
                let w = avl_curs.peek_next().map(TestNode::key);

                assert_eq!(v, w);
            }

            CursorOp::PeekPrev => {
                let v = vec_curs_prev(&vec, vec_curs).map(|i| &vec[i]);
                let w = avl_curs.peek_prev().map(TestNode::key);

                assert_eq!(v, w);
            }

            CursorOp::RemoveCurrent => {
                let v = vec_curs.map(|i| vec.remove(i));

                if vec_curs == Some(vec.len()) {
                    vec_curs = None;
                }

                let w = avl_curs.remove_current().map(|node| node.key);

                assert_eq!(v, w);
            }

            CursorOp::RemoveCurrentMovePrev => {
                let new_v_curs = vec_curs.is_some().then(|| vec_curs_prev(&vec, vec_curs));
                let v = vec_curs.map(|i| vec.remove(i));

                if let Some(vc) = new_v_curs {
                    vec_curs = vc;
                }

                let w = avl_curs
                    .remove_current_and_move_prev()
                    .map(|node| node.key);

                assert_eq!(v, w);
            }
        }

        let v = vec_curs.map(|i| &vec[i]);
        let w = avl_curs.get().map(TestNode::key);

        assert_eq!(v, w);
    }

    drop(avl_curs);
    avl.assert_invariants();
    assert!(avl.iter().map(|node| node.key).eq(vec));
}
