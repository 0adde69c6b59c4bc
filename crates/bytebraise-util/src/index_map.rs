use std::hash::Hash;

use indexmap::IndexMap;

/// Group `(key, value)` pairs into an `IndexMap`, keeping first-seen key order and the order of
/// values within each group.
///
/// Code based on [`.into_group_map()`](itertools::Itertools::into_group_map)
pub fn into_index_map<I, K, V>(iter: I) -> IndexMap<K, Vec<V>>
where
    I: Iterator<Item = (K, V)>,
    K: Hash + Eq,
{
    let mut lookup = IndexMap::new();

    iter.for_each(|(key, val)| {
        lookup.entry(key).or_insert_with(Vec::new).push(val);
    });

    lookup
}

pub trait IntoIndexMap: Iterator {
    fn into_index_map_by<K, V, F>(self, f: F) -> IndexMap<K, Vec<V>>
    where
        Self: Iterator<Item = V> + Sized,
        K: Hash + Eq,
        F: Fn(&V) -> K,
    {
        into_index_map(self.map(|v| (f(&v), v)))
    }
}

impl<T> IntoIndexMap for T where T: Iterator + ?Sized {}
