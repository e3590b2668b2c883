//! Persistent ordered maps with constant-time hashing
//!
//! States are compared and hashed every time the engine looks a node up in
//! the exploded graph, so every map that is part of a state keeps a running
//! fingerprint: the XOR of the hashes of its entries. Inserting or removing
//! an entry updates the fingerprint in O(1) on top of the O(log n) tree
//! update, and [`Hash`] only feeds the length and the fingerprint.
//!
//! Equality still compares entries, after the cheap length and fingerprint
//! checks rule most mismatches out.

use rpds::RedBlackTreeMap;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Clone)]
pub struct PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
    map: RedBlackTreeMap<K, V>,
    fingerprint: u64,
}

fn entry_hash<K: Hash, V: Hash>(key: &K, value: &V) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            map: RedBlackTreeMap::new(),
            fingerprint: 0,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// A copy of the map with `key` bound to `value`.
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut fingerprint = self.fingerprint;
        if let Some(old) = self.map.get(&key) {
            if *old == value {
                return self.clone();
            }
            fingerprint ^= entry_hash(&key, old);
        }
        fingerprint ^= entry_hash(&key, &value);
        Self {
            map: self.map.insert(key, value),
            fingerprint,
        }
    }

    /// A copy of the map without `key`.
    pub fn remove(&self, key: &K) -> Self {
        match self.map.get(key) {
            Some(old) => Self {
                fingerprint: self.fingerprint ^ entry_hash(key, old),
                map: self.map.remove(key),
            },
            None => self.clone(),
        }
    }

    /// Keep only the entries `keep` accepts.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> Self {
        let mut result = self.clone();
        for (key, value) in self.map.iter() {
            if !keep(key, value) {
                result = result.remove(key);
            }
        }
        result
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> Default for PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PartialEq for PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.fingerprint == other.fingerprint
            && self.map.iter().zip(other.map.iter()).all(|(a, b)| a == b)
    }
}

impl<K, V> Eq for PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
}

impl<K, V> Hash for PersistentMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Hash + Eq + Clone,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        self.fingerprint.hash(state);
    }
}

impl<K, V> fmt::Debug for PersistentMap<K, V>
where
    K: Ord + Hash + Clone + fmt::Debug,
    V: Hash + Eq + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_updates_are_persistent() {
        let empty: PersistentMap<u32, i64> = PersistentMap::new();
        let one = empty.insert(1, 10);
        let two = one.insert(2, 20);
        let replaced = two.insert(1, 11);

        assert!(empty.is_empty());
        assert_eq!(one.get(&1), Some(&10));
        assert_eq!(two.get(&1), Some(&10));
        assert_eq!(replaced.get(&1), Some(&11));
        assert_eq!(two.remove(&2), one);
        assert_eq!(two.remove(&7), two);
    }

    #[test]
    fn test_equal_maps_hash_equal() {
        let a = PersistentMap::new().insert(1u32, 1i64).insert(2, 2).insert(3, 3);
        let b = PersistentMap::new().insert(3u32, 3i64).insert(1, 1).insert(2, 2);
        let c = b.insert(2, 5).insert(2, 2);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&c));
        assert_ne!(a, a.insert(4, 4));
        assert_ne!(a, a.retain(|k, _| *k != 2));
        assert_eq!(a.retain(|k, _| *k != 2).len(), 2);
    }
}
