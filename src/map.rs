use core::{fmt, marker::PhantomPinned, ops::ControlFlow, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Comparator, Duplicates, Iter, LoadError, Links, OrdComparator, Range, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
///
/// # Examples
///
/// ```
/// use cordyceps_avl::{AvlMap, Duplicates};
///
/// let mut map = AvlMap::with_duplicates(Duplicates::Reject);
/// for key in [5, 1, 9, 3, 7] {
///     map.insert(key, key * 10);
/// }
///
/// let in_range: Vec<_> = map.range(&3, &7).map(|(k, _)| *k).collect();
/// assert_eq!(in_range, [3, 5, 7]);
///
/// assert_eq!(map.pop_first(), Some((1, 10)));
/// assert_eq!(map.pop_last(), Some((9, 90)));
/// assert!(map.is_balanced());
/// ```
pub struct AvlMap<K, V, C = OrdComparator> {
    tree: AvlTree<MapNode<K, V>, C>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    fn into_pair(self: Box<Self>) -> (K, V) {
        let MapNode { key, value, .. } = *self;
        (key, value)
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// A handle to an entry of an [`AvlMap`], borrowed from the map.
///
/// A handle can walk to its in-order neighbors without going through the map again.
pub struct NodeRef<'map, K, V> {
    node: &'map MapNode<K, V>,
}

impl<K, V> Clone for NodeRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeRef<'_, K, V> {}

impl<'map, K, V> NodeRef<'map, K, V> {
    fn new(node: &'map MapNode<K, V>) -> Self {
        NodeRef { node }
    }

    /// Returns the key of this entry.
    pub fn key(&self) -> &'map K {
        &self.node.key
    }

    /// Returns the value of this entry.
    pub fn value(&self) -> &'map V {
        &self.node.value
    }

    /// Returns the balance factor of this entry's node.
    pub fn balance(&self) -> i8 {
        self.node.links.balance()
    }

    /// Returns the entry with the next greater key.
    pub fn next(&self) -> Option<NodeRef<'map, K, V>> {
        crate::next(self.node).map(NodeRef::new)
    }

    /// Returns the entry with the next smaller key.
    pub fn prev(&self) -> Option<NodeRef<'map, K, V>> {
        crate::prev(self.node).map(NodeRef::new)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for NodeRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", &self.node.key)
            .field("value", &self.node.value)
            .finish()
    }
}

/// An iterator over the entries of an [`AvlMap`] in ascending key order.
pub struct MapIter<'map, K, V> {
    inner: Iter<'map, MapNode<K, V>>,
}

impl<'map, K, V> Iterator for MapIter<'map, K, V> {
    type Item = (&'map K, &'map V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| (&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for MapIter<'_, K, V> {}

impl<K, V> core::iter::FusedIterator for MapIter<'_, K, V> {}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap` ordered by `Ord` that allows duplicate keys.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Creates a new, empty `AvlMap` ordered by `Ord` with the given duplicate policy.
    pub const fn with_duplicates(duplicates: Duplicates) -> Self {
        Self {
            tree: AvlTree::with_duplicates(duplicates),
        }
    }
}

impl<K, V, C> AvlMap<K, V, C> {
    /// Creates a new, empty `AvlMap` ordered by `cmp`.
    pub const fn with_comparator(cmp: C, duplicates: Duplicates) -> Self {
        Self {
            tree: AvlTree::with_comparator(cmp, duplicates),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the duplicate policy chosen at construction.
    pub fn duplicates(&self) -> Duplicates {
        self.tree.duplicates()
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| (&node.key, &node.value))
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| (&node.key, &node.value))
    }

    /// Returns the minimum key in the map.
    #[inline]
    pub fn min_key(&self) -> Option<&K> {
        self.tree.first().map(|node| &node.key)
    }

    /// Returns the maximum key in the map.
    #[inline]
    pub fn max_key(&self) -> Option<&K> {
        self.tree.last().map(|node| &node.key)
    }

    /// Returns a handle to the entry with the minimum key.
    pub fn min_node(&self) -> Option<NodeRef<'_, K, V>> {
        self.tree.first().map(NodeRef::new)
    }

    /// Returns a handle to the entry with the maximum key.
    pub fn max_node(&self) -> Option<NodeRef<'_, K, V>> {
        self.tree.last().map(NodeRef::new)
    }

    /// Returns a handle to the entry at the root of the tree.
    pub fn root_node(&self) -> Option<NodeRef<'_, K, V>> {
        self.tree.root().map(NodeRef::new)
    }

    /// Returns a handle to the entry at in-order position `index`.
    ///
    /// This walks the map and completes in _O(n)_ time.
    pub fn at(&self, index: usize) -> Option<NodeRef<'_, K, V>> {
        self.tree.at(index).map(NodeRef::new)
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(MapNode::into_pair)
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(MapNode::into_pair)
    }

    /// Returns an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> MapIter<'_, K, V> {
        MapIter {
            inner: self.tree.iter(),
        }
    }

    /// Returns an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.tree.iter().map(|node| &node.key)
    }

    /// Returns an iterator over the values of the map, in key order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.tree.iter().map(|node| &node.value)
    }

    /// Calls `f` on every entry in ascending key order until it breaks.
    ///
    /// Returns the break value, or `None` if every entry was visited.
    pub fn visit<B, F>(&self, mut f: F) -> Option<B>
    where
        F: FnMut(&K, &V) -> ControlFlow<B>,
    {
        match self.iter().try_for_each(|(key, value)| f(key, value)) {
            ControlFlow::Break(b) => Some(b),
            ControlFlow::Continue(()) => None,
        }
    }

    /// Returns `true` if every node satisfies the AVL height bound.
    ///
    /// See [`AvlTree::is_balanced`].
    pub fn is_balanced(&self) -> bool {
        self.tree.is_balanced()
    }

    /// Returns the height of the underlying tree in levels.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Renders the tree shape sideways, printing each entry with `printer`.
    ///
    /// See [`AvlTree::render`].
    pub fn render<F, D>(&self, mut printer: F) -> String
    where
        F: FnMut(&K, &V) -> D,
        D: fmt::Display,
    {
        self.tree.render(|node| printer(&node.key, &node.value))
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<K, V, C: Comparator<K>> AvlMap<K, V, C> {
    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.tree.get(key).map(|node| &node.value)
    }

    /// Returns a handle to the entry associated with `key`.
    #[inline]
    pub fn get_node(&self, key: &K) -> Option<NodeRef<'_, K, V>> {
        self.tree.get(key).map(NodeRef::new)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        // SAFETY: Pinning is not structural for `node.value`, and neither the key nor the links
        // are touched.
        unsafe { self.tree.get_mut(key) }.map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If duplicates are rejected and `key` is already present, its entry is replaced and the
    /// previous value is returned. Otherwise the pair is added and this returns `None`.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.tree
            .insert(MapNode::new(key, value))
            .map(|node| node.into_pair().1)
    }

    /// Removes the entry associated with `key` from the map and returns its value.
    #[inline]
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.tree.remove(key).map(|node| node.into_pair().1)
    }

    /// Returns an iterator over the entries with keys in `low..=high`, sorted by key.
    pub fn range<'map>(
        &'map self,
        low: &'map K,
        high: &'map K,
    ) -> impl Iterator<Item = (&'map K, &'map V)> + 'map {
        let range: Range<'map, MapNode<K, V>, C> = self.tree.range(low, high);
        range.map(|node| (&node.key, &node.value))
    }

    /// Calls `f` on every entry with a key in `low..=high`, in ascending key order, until it
    /// breaks.
    ///
    /// Returns the break value, or `None` if every entry in range was visited.
    pub fn visit_range<B, F>(&self, low: &K, high: &K, mut f: F) -> Option<B>
    where
        F: FnMut(&K, &V) -> ControlFlow<B>,
    {
        match self.range(low, high).try_for_each(|(key, value)| f(key, value)) {
            ControlFlow::Break(b) => Some(b),
            ControlFlow::Continue(()) => None,
        }
    }

    /// Builds the map from paired `keys` and `values` in one pass.
    ///
    /// The keys must be in ascending order unless `presort` is set, in which case the pairs are
    /// sorted by key first (stably, so equal keys keep their relative order). Passing unsorted keys
    /// without `presort` yields a map whose lookups are unreliable.
    ///
    /// # Errors
    ///
    /// Fails without modifying the map if the map is not empty or if `keys` and `values` differ in
    /// length.
    pub fn load<IK, IV>(&mut self, keys: IK, values: IV, presort: bool) -> Result<&mut Self, LoadError>
    where
        IK: IntoIterator<Item = K>,
        IV: IntoIterator<Item = V>,
    {
        if !self.is_empty() {
            return Err(LoadError::NotEmpty { len: self.len() });
        }

        let keys: Vec<K> = keys.into_iter().collect();
        let values: Vec<V> = values.into_iter().collect();

        if keys.len() != values.len() {
            return Err(LoadError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        let nodes = keys
            .into_iter()
            .zip(values)
            .map(|(key, value)| MapNode::new(key, value));
        self.tree.load(nodes, presort)?;

        Ok(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self)
    where
        K: fmt::Debug,
    {
        self.tree.assert_invariants();
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for AvlMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Renders the tree shape with each entry's key.
impl<K: fmt::Display, V, C> fmt::Display for AvlMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.tree
            .write_rendered(f, &mut |node: &MapNode<K, V>| node.key.to_string())
    }
}

impl<'map, K, V, C> IntoIterator for &'map AvlMap<K, V, C> {
    type Item = (&'map K, &'map V);
    type IntoIter = MapIter<'map, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, C: Comparator<K>> Extend<(K, V)> for AvlMap<K, V, C> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AvlMap::new();
        map.extend(iter);
        map
    }
}
