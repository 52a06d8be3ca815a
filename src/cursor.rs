use core::{marker::PhantomData, ptr::NonNull};

use crate::{predecessor_raw, successor_raw, AvlTree, Link, Links, TreeNode};

/// A cursor over an [`AvlTree`].
///
/// A cursor points either to an element of the tree or to a "ghost" non-element that connects the
/// last element to the first.
pub struct Cursor<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    curs: CursorRaw<T, C>,
    phantom: PhantomData<&'tree AvlTree<T, C>>,
}

impl<'tree, T, C> Cursor<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree AvlTree<T, C>) -> Cursor<'tree, T, C> {
        Cursor {
            curs: CursorRaw::first(tree.into()),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree AvlTree<T, C>) -> Cursor<'tree, T, C> {
        Cursor {
            curs: CursorRaw::last(tree.into()),
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the first
    /// element. If it is pointing to the last element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the last
    /// element. If it is pointing to the first element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&'tree T> {
        unsafe { self.curs.get() }
    }

    /// Returns a reference to the next item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the first element.
    /// If it is pointing to the last element, this method returns `None`.
    pub fn peek_next(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek_next() }
    }

    /// Returns a reference to the previous item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the last element.
    /// If it is pointing to the first element, this method returns `None`.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek_prev() }
    }
}

/// A cursor over an [`AvlTree`] which supports editing operations.
///
/// A cursor points either to an element of the tree or to a "ghost" non-element that connects the
/// last element to the first.
pub struct CursorMut<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    curs: CursorRaw<T, C>,
    phantom: PhantomData<&'tree mut AvlTree<T, C>>,
}

impl<'tree, T, C> CursorMut<'tree, T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree mut AvlTree<T, C>) -> CursorMut<'tree, T, C> {
        CursorMut {
            curs: CursorRaw::first(tree.into()),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree mut AvlTree<T, C>) -> CursorMut<'tree, T, C> {
        CursorMut {
            curs: CursorRaw::last(tree.into()),
            phantom: PhantomData,
        }
    }

    /// Returns a read-only cursor pointing to the current element.
    ///
    /// The `CursorMut` remains immutably borrowed for the lifetime of the returned `Cursor`.
    pub fn as_cursor(&self) -> Cursor<'_, T, C> {
        Cursor {
            curs: CursorRaw {
                tree: self.curs.tree,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method will move it to the first
    /// element. If it is pointing to the last element, this method will move it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `AvlTree`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method will move it to the last
    /// element. If it is pointing to the first element, this method will move it to the "ghost"
    /// non-element.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&T> {
        unsafe { self.curs.get() }
    }

    /// Returns a reference to the next item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the first element.
    /// If it is pointing to the last element, this method returns `None`.
    pub fn peek_next(&self) -> Option<&T> {
        unsafe { self.curs.peek_next() }
    }

    /// Returns a reference to the previous item.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method returns the last element.
    /// If it is pointing to the first element, this method returns `None`.
    pub fn peek_prev(&self) -> Option<&T> {
        unsafe { self.curs.peek_prev() }
    }

    /// Removes the current element from the tree.
    ///
    /// This returns the removed element and moves the cursor to the next element. If the cursor is
    /// pointing to the "ghost" non-element, this method returns `None`, and neither the tree nor
    /// the cursor is modified.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.remove_current() }
    }

    /// Removes the current element from the tree.
    ///
    /// This returns the removed element and moves the cursor to the previous element. If the
    /// cursor is pointing to the "ghost" non-element, this method returns `None`, and neither the
    /// tree nor the cursor is modified.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.remove_current_and_move_prev() }
    }
}

struct CursorRaw<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: NonNull<AvlTree<T, C>>,
    ptr: Link<T>,
}

impl<T, C> CursorRaw<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn first(tree: NonNull<AvlTree<T, C>>) -> CursorRaw<T, C> {
        CursorRaw {
            tree,
            ptr: unsafe { tree.as_ref().first() }.map(NonNull::from),
        }
    }

    fn last(tree: NonNull<AvlTree<T, C>>) -> CursorRaw<T, C> {
        CursorRaw {
            tree,
            ptr: unsafe { tree.as_ref().last() }.map(NonNull::from),
        }
    }

    unsafe fn move_next(&mut self) {
        self.ptr = unsafe { self.peek_next_raw() };
    }

    unsafe fn move_prev(&mut self) {
        self.ptr = unsafe { self.peek_prev_raw() };
    }

    unsafe fn get<'a>(&self) -> Option<&'a T> {
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    unsafe fn peek_next<'a>(&self) -> Option<&'a T> {
        unsafe { self.peek_next_raw() }.map(|p| unsafe { p.as_ref() })
    }

    unsafe fn peek_prev<'a>(&self) -> Option<&'a T> {
        unsafe { self.peek_prev_raw() }.map(|p| unsafe { p.as_ref() })
    }

    unsafe fn peek_next_raw(&self) -> Link<T> {
        match self.ptr {
            Some(p) => unsafe { successor_raw(p) },
            None => unsafe { self.tree.as_ref().first() }.map(NonNull::from),
        }
    }

    unsafe fn peek_prev_raw(&self) -> Link<T> {
        match self.ptr {
            Some(p) => unsafe { predecessor_raw(p) },
            None => unsafe { self.tree.as_ref().last() }.map(NonNull::from),
        }
    }

    unsafe fn remove_current(&mut self) -> Option<T::Handle> {
        let remove = self.ptr?;

        unsafe {
            self.move_next();
            Some(self.tree.as_mut().remove_at(remove))
        }
    }

    unsafe fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        let remove = self.ptr?;

        unsafe {
            self.move_prev();
            Some(self.tree.as_mut().remove_at(remove))
        }
    }
}
