use core::{cmp::Ordering, iter::FusedIterator, marker::PhantomData, ptr::NonNull};

use crate::{links, Comparator, Link, Links, TreeNode};

/// An in-order iterator over the elements of an [`AvlTree`](crate::AvlTree).
///
/// The walk keeps the unvisited ancestors of the current node on an explicit stack, so it never
/// recurses.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    stack: Vec<NonNull<T>>,
    len: usize,
    _tree: PhantomData<&'tree T>,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(root: Link<T>, len: usize) -> Self {
        let mut iter = Iter {
            stack: Vec::new(),
            len,
            _tree: PhantomData,
        };
        iter.push_left(root);
        iter
    }

    // Pushes `node` and the chain of left children below it.
    fn push_left(&mut self, mut opt_node: Link<T>) {
        while let Some(node) = opt_node {
            self.stack.push(node);
            opt_node = unsafe { links(node).left() };
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // The left subtree of `node` has been exhausted; its right subtree is up next.
        self.push_left(unsafe { links(node).right() });
        self.len -= 1;

        Some(unsafe { node.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

/// An in-order iterator over the elements of an [`AvlTree`](crate::AvlTree) whose keys lie in an
/// inclusive range.
///
/// Subtrees entirely below the lower bound are never entered, and the walk ends at the first key
/// above the upper bound.
pub struct Range<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    stack: Vec<NonNull<T>>,
    cmp: &'tree C,
    low: &'tree T::Key,
    high: &'tree T::Key,
    _tree: PhantomData<&'tree T>,
}

impl<'tree, T, C> Range<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
    C: Comparator<T::Key>,
{
    pub(crate) fn new(root: Link<T>, cmp: &'tree C, low: &'tree T::Key, high: &'tree T::Key) -> Self {
        let mut range = Range {
            stack: Vec::new(),
            cmp,
            low,
            high,
            _tree: PhantomData,
        };
        range.push_left(root);
        range
    }

    // Like `Iter::push_left`, but a node below the lower bound is skipped together with its left
    // subtree, since everything there precedes it in order.
    fn push_left(&mut self, mut opt_node: Link<T>) {
        while let Some(node) = opt_node {
            let key = unsafe { node.as_ref().key() };

            opt_node = if self.cmp.compare(key, self.low) == Ordering::Less {
                unsafe { links(node).right() }
            } else {
                self.stack.push(node);
                unsafe { links(node).left() }
            };
        }
    }
}

impl<'tree, T, C> Iterator for Range<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
    C: Comparator<T::Key>,
{
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let item = unsafe { node.as_ref() };

        if self.cmp.compare(item.key(), self.high) == Ordering::Greater {
            // Every remaining element follows this one.
            self.stack.clear();
            return None;
        }

        self.push_left(unsafe { links(node).right() });

        Some(item)
    }
}

impl<T, C> FusedIterator for Range<'_, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
    C: Comparator<T::Key>,
{
}
