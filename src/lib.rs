//! An intrusive AVL tree with parent links.
//!
//! Conventions used in comments:
//! - The height of a node `x` is denoted `h(x)`; a missing child has height 0.
//! - The balance factor of a node `x` is `b(x) = h(left(x)) - h(right(x))`.
//! - A node is left-heavy if `b(x) > 0` and right-heavy if `b(x) < 0`.
//!
//! The fundamental invariants of an AVL tree are:
//! 1. The in-order sequence of keys is sorted under the tree's comparator.
//! 2. `|b(x)| <= 1` for every node `x`.
//!
//! Balance factors are never recomputed from heights during mutation. Insertion and removal adjust
//! them by one per level while walking towards the root, and rotations derive the new factors of
//! the two rotated nodes from their old ones.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, ptr::NonNull,
};

use cordyceps::Linked;

mod compare;
mod cursor;
mod debug;
mod error;
mod iter;
mod map;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use compare::{Comparator, OrdComparator};
pub use cursor::{Cursor, CursorMut};
pub use error::LoadError;
pub use iter::{Iter, Range};
pub use map::{AvlMap, MapIter, NodeRef};

pub trait TreeNode<L>: Linked<L> {
    type Key;

    fn key(&self) -> &Self::Key;
}

/// How a tree treats an inserted key that compares equal to a key already present.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Duplicates {
    /// Equal keys are stored side by side. A new key is placed before the equal keys already in
    /// the tree.
    #[default]
    Allow,
    /// An equal key replaces the existing entry and the tree keeps its size.
    Reject,
}

/// An intrusive AVL tree.
///
/// Every node carries a parent link and a balance factor, so insertion performs at most one
/// (single or double) rotation and removal walks towards the root rotating where needed. Both
/// complete in _O(log(n))_ time.
pub struct AvlTree<T, C = OrdComparator>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
    cmp: C,
    duplicates: Duplicates,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    // The change in `b(x)` when the `self` subtree of `x` grows by one level.
    #[inline]
    fn weight(self) -> i8 {
        match self {
            Dir::Left => 1,
            Dir::Right => -1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

pub(crate) type Link<T> = Option<NonNull<T>>;

// SAFETY: the tree exclusively owns its nodes; sending or sharing it is equivalent to sending or
// sharing the nodes themselves.
unsafe impl<T, C> Send for AvlTree<T, C>
where
    T: TreeNode<Links<T>> + Send + ?Sized,
    C: Send,
{
}

unsafe impl<T, C> Sync for AvlTree<T, C>
where
    T: TreeNode<Links<T>> + Sync + ?Sized,
    C: Sync,
{
}

// SAFETY: the links are only read or written through the tree that owns the node, so they are
// as thread-safe as the node itself.
unsafe impl<T: Send + ?Sized> Send for Links<T> {}
unsafe impl<T: Sync + ?Sized> Sync for Links<T> {}

#[inline]
pub(crate) unsafe fn links<'a, T>(node: NonNull<T>) -> &'a Links<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_ref() }
}

/// Returns the in-order successor of `node`.
///
/// `node` must be borrowed from a tree (or be a node that was never inserted, in which case this
/// returns `None`). Runs in amortized _O(1)_ and worst-case _O(log(n))_ time.
pub fn next<T>(node: &T) -> Option<&T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // SAFETY: `node` is borrowed, so the tree it belongs to cannot be mutated for the lifetime of
    // the returned reference.
    unsafe { successor_raw(NonNull::from(node)).map(|n| n.as_ref()) }
}

/// Returns the in-order predecessor of `node`.
///
/// See [`next`].
pub fn prev<T>(node: &T) -> Option<&T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { predecessor_raw(NonNull::from(node)).map(|n| n.as_ref()) }
}

pub(crate) unsafe fn successor_raw<T>(node: NonNull<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { neighbor_raw(node, Dir::Right) }
}

pub(crate) unsafe fn predecessor_raw<T>(node: NonNull<T>) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { neighbor_raw(node, Dir::Left) }
}

// Returns the in-order neighbor of `node` in direction `dir`.
unsafe fn neighbor_raw<T>(node: NonNull<T>, dir: Dir) -> Link<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe {
        // If the subtree on the `dir` side is not empty, the neighbor is its extreme node on the
        // `!dir` side.
        if let Some(child) = links(node).child(dir) {
            return Some(extreme_in_subtree(child, !dir));
        }

        // Otherwise, climb until arriving from a `!dir` child.
        let mut cur = node;
        while let Some(parent) = links(cur).parent() {
            if links(parent).child(!dir) == Some(cur) {
                return Some(parent);
            }

            cur = parent;
        }

        None
    }
}

// Returns the extreme node on the `dir` side of the subtree rooted at `root`.
#[inline]
unsafe fn extreme_in_subtree<T>(root: NonNull<T>, dir: Dir) -> NonNull<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    let mut cur = root;

    while let Some(child) = unsafe { links(cur).child(dir) } {
        cur = child;
    }

    cur
}

impl<T> AvlTree<T, OrdComparator>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree ordered by `Ord` that allows duplicate keys.
    pub const fn new() -> AvlTree<T, OrdComparator> {
        AvlTree::with_comparator(OrdComparator, Duplicates::Allow)
    }

    /// Returns a new empty tree ordered by `Ord` with the given duplicate policy.
    pub const fn with_duplicates(duplicates: Duplicates) -> AvlTree<T, OrdComparator> {
        AvlTree::with_comparator(OrdComparator, duplicates)
    }
}

impl<T> Default for AvlTree<T, OrdComparator>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree ordered by `cmp`.
    pub const fn with_comparator(cmp: C, duplicates: Duplicates) -> AvlTree<T, C> {
        AvlTree {
            root: None,
            len: 0,
            cmp,
            duplicates,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub fn is_empty(&self) -> bool {
        let empty = self.len() == 0;
        debug_assert_eq!(empty, self.root.is_none());
        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the comparator that orders this tree.
    pub fn comparator(&self) -> &C {
        &self.cmp
    }

    /// Returns the duplicate policy chosen at construction.
    pub fn duplicates(&self) -> Duplicates {
        self.duplicates
    }

    /// Returns the root element of the tree.
    pub fn root(&self) -> Option<&T> {
        self.root.map(|root| unsafe { root.as_ref() })
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<&T> {
        let root = self.root?;
        unsafe { Some(extreme_in_subtree(root, Dir::Left).as_ref()) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<&T> {
        let root = self.root?;
        unsafe { Some(extreme_in_subtree(root, Dir::Right).as_ref()) }
    }

    /// Returns the element at in-order position `index`.
    ///
    /// This walks the tree and completes in _O(n)_ time.
    pub fn at(&self, index: usize) -> Option<&T> {
        self.iter().nth(index)
    }

    /// Returns an iterator over the elements in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.root, self.len)
    }

    /// Returns a cursor pointing at the minimum element.
    pub fn cursor_first(&self) -> Cursor<'_, T, C> {
        Cursor::first(self)
    }

    /// Returns a cursor pointing at the maximum element.
    pub fn cursor_last(&self) -> Cursor<'_, T, C> {
        Cursor::last(self)
    }

    /// Returns an editing cursor pointing at the minimum element.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T, C> {
        CursorMut::first(self)
    }

    /// Returns an editing cursor pointing at the maximum element.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T, C> {
        CursorMut::last(self)
    }

    /// Returns the height of the tree in levels. An empty tree has height 0.
    pub fn height(&self) -> usize {
        // Following the heavier side from the root visits one node per level.
        let mut height = 0;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            height += 1;
            let cur_links = unsafe { links(cur) };
            opt_cur = if cur_links.balance() < 0 {
                cur_links.right()
            } else {
                cur_links.left()
            };
        }

        height
    }

    /// Returns `true` if every node satisfies the AVL height bound.
    ///
    /// The heights are measured from scratch and the stored balance factors are ignored, so this
    /// runs in _O(n)_ time.
    pub fn is_balanced(&self) -> bool {
        fn measure<T>(node: Link<T>) -> Option<usize>
        where
            T: TreeNode<Links<T>> + ?Sized,
        {
            let Some(node) = node else {
                return Some(0);
            };

            let node_links = unsafe { links(node) };
            let left = measure(node_links.left())?;
            let right = measure(node_links.right())?;

            (left.abs_diff(right) <= 1).then_some(1 + left.max(right))
        }

        measure(self.root).is_some()
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let root = self.root?;
        unsafe { Some(self.remove_at(extreme_in_subtree(root, Dir::Left))) }
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let root = self.root?;
        unsafe { Some(self.remove_at(extreme_in_subtree(root, Dir::Right))) }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let len = self.len;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let cur = extreme_in_subtree(cur, Dir::Left);
                let parent = links(cur).parent();
                let right = links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                if let Some(right) = right {
                    links(right).set_parent(parent);
                }

                // Drop the node.
                links(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);

        if len > 0 {
            tracing::debug!(len, "cleared tree");
        }
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are two cases:
        //
        // 1. `node` has at most one child.
        //
        //    The child (or nothing) is elevated into `node`'s place, and the subtree of `node`'s
        //    parent on `node`'s side loses one level.
        //
        // 2. `node` has two children.
        //
        //    A neighbor[^1] taken from the taller subtree (the left one on ties) is unlinked as in
        //    case 1 and then assumes `node`'s place, links and balance factor. The subtree that
        //    lost a level is the one the neighbor was unlinked from.
        //
        // In both cases the retrace starts at the parent of the level that shrank.
        //
        // [^1]: The predecessor (maximum of the left subtree) or the successor (minimum of the
        //       right subtree). Neither has a child on the side facing `node`.

        unsafe {
            let parent = links(node).parent();
            let node_dir = parent.map(|p| self.which_child(p, node));

            let shrunk = match (links(node).left(), links(node).right()) {
                (Some(_), Some(_)) => {
                    let side = if links(node).balance() >= 0 {
                        Dir::Left
                    } else {
                        Dir::Right
                    };

                    let subtree = links(node).child(side).expect("node has two children");
                    let other = links(node).child(!side).expect("node has two children");
                    let replacement = extreme_in_subtree(subtree, !side);
                    let replacement_parent = links(replacement)
                        .parent()
                        .expect("replacement must have a parent");
                    let replacement_child = links(replacement).child(side);

                    let shrunk = if replacement_parent == node {
                        // The replacement keeps its own `side` subtree, which sits one level lower
                        // than it did under `node`.
                        (replacement, side)
                    } else {
                        // Elevate the replacement's only child to replace it.
                        self.replace_child(replacement_parent, replacement, replacement_child);
                        if let Some(child) = replacement_child {
                            links(child).set_parent(Some(replacement_parent));
                        }

                        links(replacement).set_child(side, Some(subtree));
                        links(subtree).set_parent(Some(replacement));

                        (replacement_parent, !side)
                    };

                    // Transfer the position and balance factor of `node` to the replacement.
                    self.replace_child_or_set_root(parent, node, Some(replacement));
                    links(replacement).set_parent(parent);
                    links(replacement).set_child(!side, Some(other));
                    links(replacement).set_balance(links(node).balance());
                    links(other).set_parent(Some(replacement));

                    Some(shrunk)
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    links(child).set_parent(parent);

                    parent.zip(node_dir)
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);

                    parent.zip(node_dir)
                }
            };

            links(node).clear();
            self.len -= 1;

            if let Some((shrunk, dir)) = shrunk {
                self.rebalance_removed(shrunk, dir);
            }

            T::from_ptr(node)
        }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self)
    where
        C: Comparator<T::Key>,
        T::Key: fmt::Debug,
    {
        if let Some(root) = self.root {
            assert_eq!(unsafe { links(root).parent() }, None, "root must not have a parent");
        }

        let (count, _) = unsafe { self.assert_invariants_at(self.root) };
        assert_eq!(count, self.len, "tree length must match the number of reachable nodes");

        // The in-order key sequence must be sorted, strictly so if duplicates are rejected.
        let mut iter = self.iter();
        if let Some(mut prev) = iter.next() {
            for cur in iter {
                let ordering = self.cmp.compare(prev.key(), cur.key());
                match self.duplicates {
                    Duplicates::Allow => assert_ne!(
                        ordering,
                        Ordering::Greater,
                        "{:?} ordered before {:?}",
                        prev.key(),
                        cur.key()
                    ),
                    Duplicates::Reject => assert_eq!(
                        ordering,
                        Ordering::Less,
                        "{:?} ordered before {:?}",
                        prev.key(),
                        cur.key()
                    ),
                }
                prev = cur;
            }
        }
    }

    // Returns the number of nodes and the height of the subtree rooted at `node`.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(&self, node: Link<T>) -> (usize, i32) {
        let Some(node) = node else {
            return (0, 0);
        };

        unsafe {
            let mut counts = [0; 2];
            let mut heights = [0; 2];

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    (counts[dir as usize], heights[dir as usize]) =
                        self.assert_invariants_at(Some(child));
                }
            }

            // Ensure the stored balance factor matches the measured one and is in range.
            let balance = links(node).balance();
            assert_eq!(i32::from(balance), heights[0] - heights[1]);
            assert!((-1..=1).contains(&balance), "unbalanced node: {balance}");

            (1 + counts[0] + counts[1], 1 + heights[0].max(heights[1]))
        }
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(&mut self, parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            if let Some(new_child) = new_child {
                debug_assert_ne!(
                    links(parent).child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            links(parent).set_child(dir, new_child);
        }
    }

    // Rotates the subtree rooted at `down` in direction `dir`, promoting its `!dir` child.
    //
    // A left rotation (`dir == Left`) promotes the right child and a right rotation promotes the
    // left child. Returns the promoted node, which is the new subtree root, or `None` without
    // modifying the tree if `down` has no `!dir` child.
    unsafe fn rotate(&mut self, down: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            let up = links(down).child(!dir)?;

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let across = links(up).child(dir);
            links(down).set_child(!dir, across);
            if let Some(across) = across {
                links(across).set_parent(Some(down));
            }

            links(up).set_child(dir, Some(down));
            let parent = links(down).set_parent(Some(up));
            links(up).set_parent(parent);
            self.replace_child_or_set_root(parent, down, Some(up));

            let (down_balance, up_balance) =
                rotated_balances(dir, links(down).balance(), links(up).balance());
            links(down).set_balance(down_balance);
            links(up).set_balance(up_balance);

            Some(up)
        }
    }

    // Restores the balance of `node`, whose balance factor is +2 or -2, and returns the root of
    // the rebalanced subtree.
    unsafe fn rebalance_at(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe {
            let balance = links(node).balance();
            let heavy = if balance > 0 { Dir::Left } else { Dir::Right };
            let child = links(node)
                .child(heavy)
                .expect("the heavy side of an unbalanced node must not be empty");

            // If the child leans away from the heavy side, straighten it first.
            let double = links(child).balance() * heavy.weight() < 0;
            if double {
                self.rotate(child, heavy)
                    .expect("inner grandchild must exist for a double rotation");
            }

            tracing::trace!(balance, double, "rotating unbalanced node");

            self.rotate(node, !heavy)
                .expect("heavy child must exist for a rotation")
        }
    }

    // Performs a bottom-up rebalance after a leaf was attached as the `dir` child of `node`.
    //
    // Stops as soon as a subtree keeps its height: when a balance factor becomes 0, or after the
    // first rotation, which always restores the height the subtree had before the insertion.
    unsafe fn rebalance_inserted(&mut self, mut node: NonNull<T>, mut dir: Dir) {
        unsafe {
            loop {
                let balance = links(node).balance() + dir.weight();
                links(node).set_balance(balance);

                match balance {
                    0 => return,
                    -1 | 1 => match links(node).parent() {
                        Some(parent) => {
                            dir = self.which_child(parent, node);
                            node = parent;
                        }
                        None => return,
                    },
                    _ => {
                        self.rebalance_at(node);
                        return;
                    }
                }
            }
        }
    }

    // Performs a bottom-up rebalance after the `dir` subtree of `node` lost one level.
    //
    // Unlike insertion, a rotation may itself shrink the subtree, so the walk continues until a
    // balance factor ends up at +1 or -1 (the subtree kept its height) or the root is reached.
    unsafe fn rebalance_removed(&mut self, mut node: NonNull<T>, mut dir: Dir) {
        unsafe {
            loop {
                let balance = links(node).balance() - dir.weight();
                links(node).set_balance(balance);

                if !(-1..=1).contains(&balance) {
                    node = self.rebalance_at(node);
                }

                if links(node).balance() != 0 {
                    return;
                }

                let Some(parent) = links(node).parent() else {
                    return;
                };

                dir = self.which_child(parent, node);
                node = parent;
            }
        }
    }

    // Puts `new` in the place of `old`, taking over its links and balance factor.
    unsafe fn replace_node(&mut self, old: NonNull<T>, new: NonNull<T>) -> T::Handle {
        unsafe {
            let parent = links(old).parent();
            let left = links(old).left();
            let right = links(old).right();

            self.replace_child_or_set_root(parent, old, Some(new));

            for (dir, child) in [(Dir::Left, left), (Dir::Right, right)] {
                links(new).set_child(dir, child);
                if let Some(child) = child {
                    links(child).set_parent(Some(new));
                }
            }

            links(new).set_parent(parent);
            links(new).set_balance(links(old).balance());
            links(old).clear();

            T::from_ptr(old)
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        unsafe {
            if links(parent).left() == Some(child) {
                Dir::Left
            } else if links(parent).right() == Some(child) {
                Dir::Right
            } else {
                unreachable!("`child` must be a child of `parent`")
            }
        }
    }
}

impl<T, C> AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
    C: Comparator<T::Key>,
{
    /// Returns `true` if the tree contains an element with the given key.
    pub fn contains_key(&self, key: &T::Key) -> bool {
        self.get_raw(key).is_some()
    }

    /// Returns a reference to the node corresponding to `key`.
    ///
    /// If duplicates are allowed and several nodes match, the first one met while descending from
    /// the root is returned.
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        let ptr = self.get_raw(key)?;
        unsafe { Some(ptr.as_ref()) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the returned node are
    /// modified.
    pub unsafe fn get_mut(&mut self, key: &T::Key) -> Option<core::pin::Pin<&mut T>> {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(core::pin::Pin::new_unchecked(ptr.as_mut())) }
    }

    pub(crate) fn get_raw(&self, key: &T::Key) -> Link<T> {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match self.cmp.compare(key, cur.as_ref().key()) {
                    Ordering::Less => opt_cur = links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = links(cur).right(),
                }
            }
        }
    }

    /// Returns an iterator over the elements with keys in `low..=high`, in ascending order.
    pub fn range<'tree>(&'tree self, low: &'tree T::Key, high: &'tree T::Key) -> Range<'tree, T, C> {
        Range::new(self.root, &self.cmp, low, high)
    }

    /// Inserts an item into the tree.
    ///
    /// If duplicates are rejected and the tree already holds an item with an equal key, `item`
    /// takes its place and the previous item is returned. Otherwise this returns `None`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);
        unsafe { links(ptr).clear() };

        let Some(root) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            self.root = Some(ptr);
            self.len += 1;
            return None;
        };

        let mut parent = root;

        // Descend the tree, looking for a suitable leaf.
        let dir = loop {
            let ordering = unsafe { self.cmp.compare(ptr.as_ref().key(), parent.as_ref().key()) };

            let dir = match (ordering, self.duplicates) {
                (Ordering::Less, _) => Dir::Left,
                (Ordering::Greater, _) => Dir::Right,
                // Equal keys go left, so the newest of several equal keys comes first in order.
                (Ordering::Equal, Duplicates::Allow) => Dir::Left,
                (Ordering::Equal, Duplicates::Reject) => {
                    return Some(unsafe { self.replace_node(parent, ptr) });
                }
            };

            match unsafe { links(parent).child(dir) } {
                Some(child) => parent = child,
                None => break dir,
            }
        };

        unsafe {
            links(parent).set_child(dir, Some(ptr));
            links(ptr).set_parent(Some(parent));
            self.rebalance_inserted(parent, dir);
        }

        self.len += 1;
        None
    }

    /// Removes the node corresponding to `key` from the tree and returns it.
    pub fn remove(&mut self, key: &T::Key) -> Option<T::Handle> {
        let node = self.get_raw(key)?;
        unsafe { Some(self.remove_at(node)) }
    }

    /// Builds the tree from `items` in one pass.
    ///
    /// The items must be in ascending key order unless `presort` is set, in which case they are
    /// sorted (stably) with the tree's comparator first. Unsorted items without `presort` produce
    /// a tree whose order invariant does not hold.
    ///
    /// The resulting tree has minimal height.
    ///
    /// # Errors
    ///
    /// Fails with [`LoadError::NotEmpty`] without modifying the tree if the tree is not empty.
    /// `items` is dropped in that case, together with any handles it still holds.
    pub fn load<I>(&mut self, items: I, presort: bool) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = T::Handle>,
    {
        if !self.is_empty() {
            return Err(LoadError::NotEmpty { len: self.len });
        }

        let mut nodes: Vec<NonNull<T>> = items.into_iter().map(T::into_ptr).collect();

        if presort {
            let cmp = &self.cmp;
            nodes.sort_by(|a, b| unsafe { cmp.compare(a.as_ref().key(), b.as_ref().key()) });
        }

        let (root, height) = unsafe { Self::build_balanced(&nodes, None) };
        self.root = root;
        self.len = nodes.len();

        tracing::debug!(len = self.len, height, presort, "bulk-loaded tree");

        Ok(())
    }

    // Links `nodes` into a height-minimal subtree below `parent` and returns its root and height.
    //
    // The middle node becomes the subtree root. Balance factors are derived from the heights of
    // the two halves as the recursion unwinds.
    unsafe fn build_balanced(nodes: &[NonNull<T>], parent: Link<T>) -> (Link<T>, i32) {
        if nodes.is_empty() {
            return (None, 0);
        }

        let mid = nodes.len() / 2;
        let node = nodes[mid];

        unsafe {
            let (left, left_height) = Self::build_balanced(&nodes[..mid], Some(node));
            let (right, right_height) = Self::build_balanced(&nodes[mid + 1..], Some(node));

            let node_links = links(node);
            node_links.set_parent(parent);
            node_links.set_left(left);
            node_links.set_right(right);
            node_links.set_balance((left_height - right_height) as i8);

            (Some(node), 1 + left_height.max(right_height))
        }
    }
}

// Returns the balance factors of `down` and `up` after rotating `down` in direction `dir`.
//
// With `a` the height of the subtree `up` keeps on its outer side, `b` the height of `across`, and
// `c` the height of the subtree `down` keeps, a left rotation turns
//   b(down) = c - (1 + max(b, a)),  b(up) = b - a
// into
//   b(down') = c - b,               b(up') = (1 + max(c, b)) - a
// which expands to `b(down') = b(down) + 1 - min(b(up), 0)` and
// `b(up') = b(up) + 1 + max(b(down'), 0)`. A right rotation is the mirror image.
#[inline]
fn rotated_balances(dir: Dir, down: i8, up: i8) -> (i8, i8) {
    match dir {
        Dir::Left => {
            let down = down + 1 - up.min(0);
            let up = up + 1 + down.max(0);
            (down, up)
        }
        Dir::Right => {
            let down = down - 1 - up.max(0);
            let up = up - 1 + down.min(0);
            (down, up)
        }
    }
}

impl<T, C> Drop for AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, C> fmt::Debug for AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(TreeNode::key)).finish()
    }
}

impl<'tree, T, C> IntoIterator for &'tree AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns the balance factor of the node, `h(left) - h(right)`.
    #[inline]
    pub fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    pub(crate) fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&self, parent: Link<T>) -> Link<T> {
        unsafe { mem::replace(&mut (*self.inner.get()).parent, parent) }
    }

    #[inline]
    fn set_child(&self, dir: Dir, child: Link<T>) -> Link<T> {
        unsafe { mem::replace(&mut (*self.inner.get()).children[dir as usize], child) }
    }

    #[inline]
    fn set_left(&self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&self, balance: i8) {
        unsafe { (*self.inner.get()).balance = balance };
    }

    // Detaches the links from any tree.
    #[inline]
    fn clear(&self) {
        self.set_parent(None);
        self.set_left(None);
        self.set_right(None);
        self.set_balance(0);
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
