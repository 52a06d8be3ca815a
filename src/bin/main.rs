use std::{ops::ControlFlow, ptr::NonNull};

use cordyceps::Linked;
use cordyceps_avl::{AvlMap, AvlTree, Duplicates, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct TestNode {
    links: Links<TestNode>,
    key: u32,
}

impl TestNode {
    fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
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

fn main() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in [2, 0, 3, 4, 5, 1, 6] {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
        println!("{:?}", tree.iter().map(|node| node.key).collect::<Vec<_>>());
    }

    print!("{}", tree.render(|node| node.key));

    let zero = tree.pop_first().unwrap().key;
    assert_eq!(zero, 0);
    tree.assert_invariants();

    drop(tree);

    let mut map = AvlMap::with_duplicates(Duplicates::Reject);
    map.load(
        ["ash", "birch", "cedar", "elm", "fir", "oak", "pine"],
        [1, 2, 3, 4, 5, 6, 7],
        false,
    )
    .unwrap();
    map.insert("maple", 8);
    map.remove(&"ash");

    print!("{map}");
    println!("balanced: {}, height: {}", map.is_balanced(), map.height());

    let found = map.visit_range(&"c", &"p", |name, value| {
        if *value > 4 {
            ControlFlow::Break(*name)
        } else {
            ControlFlow::Continue(())
        }
    });
    println!("first tree after \"c\" numbered above 4: {found:?}");
}
