use core::cmp::Ordering;

/// A total order over keys of type `K`.
///
/// Implementations must be antisymmetric and transitive; a tree ordered by a comparator that is
/// not a total order behaves unpredictably (but memory-safely).
///
/// Any `Fn(&K, &K) -> Ordering` closure is a comparator:
///
/// ```
/// use cordyceps_avl::{AvlMap, Duplicates};
///
/// let mut map = AvlMap::with_comparator(|a: &i32, b: &i32| b.cmp(a), Duplicates::Reject);
/// map.insert(1, "one");
/// map.insert(2, "two");
///
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [2, 1]);
/// ```
pub trait Comparator<K: ?Sized> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OrdComparator;

impl<K: Ord + ?Sized> Comparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K: ?Sized, F> Comparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}
