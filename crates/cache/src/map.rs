//! Hash-bucketed map and set
//!
//! Entries are spread over a fixed number of buckets chosen at construction.
//! Within a bucket, keys whose hashes collide are told apart by equality, so
//! the key type's `Hash` and `Eq` implementations fully define identity.
//! The bucket count only amortizes lookup cost: inserting more entries than
//! there are buckets never fails, it just makes buckets longer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use crate::error::{CacheError, CacheResult};

/// Bucket count used by [`Map::new`] and [`Set::new`]
pub const DEFAULT_CAPACITY: usize = 64;

/// Deterministic hasher used unless the caller supplies one
pub type DefaultBuildHasher = BuildHasherDefault<DefaultHasher>;

/// Hash-bucketed map
///
/// # Example
///
/// ```
/// use panoview_cache::Map;
///
/// let mut map = Map::with_capacity(16).unwrap();
/// assert_eq!(map.insert("front", 1), None);
/// assert_eq!(map.insert("front", 2), Some(1));
/// assert_eq!(map.get(&"front"), Some(&2));
/// assert_eq!(map.len(), 1);
/// ```
#[derive(Clone)]
pub struct Map<K, V, S = DefaultBuildHasher> {
    buckets: Vec<Vec<(K, V)>>,
    len: usize,
    hasher: S,
}

impl<K: Hash + Eq, V> Map<K, V> {
    /// Create a map with [`DEFAULT_CAPACITY`] buckets
    pub fn new() -> Self {
        Self::from_parts(DEFAULT_CAPACITY, DefaultBuildHasher::default())
    }

    /// Create a map with `capacity` buckets
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> CacheResult<Self> {
        Self::with_capacity_and_hasher(capacity, DefaultBuildHasher::default())
    }
}

impl<K: Hash + Eq, V> Default for Map<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> Map<K, V, S> {
    /// Create a map with `capacity` buckets hashing keys with `hasher`
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> CacheResult<Self> {
        if capacity == 0 {
            return Err(CacheError::invalid("map capacity must be a positive integer"));
        }
        Ok(Self::from_parts(capacity, hasher))
    }

    fn from_parts(capacity: usize, hasher: S) -> Self {
        Self {
            buckets: (0..capacity).map(|_| Vec::new()).collect(),
            len: 0,
            hasher,
        }
    }

    fn bucket_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    fn bucket(&self, key: &K) -> &Vec<(K, V)> {
        &self.buckets[self.bucket_index(key)]
    }

    fn bucket_mut(&mut self, key: &K) -> &mut Vec<(K, V)> {
        let index = self.bucket_index(key);
        &mut self.buckets[index]
    }

    /// Returns the value stored for `key`
    pub fn get(&self, key: &K) -> Option<&V> {
        self.bucket(key)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored for `key`
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.bucket_mut(key)
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns true if an entry equal to `key` exists
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert an entry, returning the value it replaced
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_entry(key, value).map(|(_, v)| v)
    }

    /// Insert an entry, returning the whole entry it replaced
    ///
    /// Both the stored key and the value are replaced.
    pub fn insert_entry(&mut self, key: K, value: V) -> Option<(K, V)> {
        let bucket = self.bucket_mut(&key);
        if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(slot, (key, value)));
        }
        bucket.push((key, value));
        self.len += 1;
        None
    }

    /// Remove the entry for `key`, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Remove the entry for `key`, returning the stored key and value
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let bucket = self.bucket_mut(key);
        let position = bucket.iter().position(|(k, _)| k == key)?;
        let entry = bucket.swap_remove(position);
        self.len -= 1;
        Some(entry)
    }

    /// Remove every entry matching `predicate`, returning the removed entries
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed = Vec::new();
        for bucket in &mut self.buckets {
            let mut i = 0;
            while i < bucket.len() {
                let (k, v) = &bucket[i];
                if predicate(k, v) {
                    removed.push(bucket.swap_remove(i));
                } else {
                    i += 1;
                }
            }
        }
        self.len -= removed.len();
        removed
    }
}

impl<K, V, S> Map<K, V, S> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Remove all entries, keeping the buckets
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    /// Remove and return all entries
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.len = 0;
        self.buckets.iter_mut().flat_map(std::mem::take).collect()
    }

    /// Visit all entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets.iter().flatten().map(|(k, v)| (k, v))
    }

    /// Visit all entries mutably in unspecified order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.buckets
            .iter_mut()
            .flatten()
            .map(|(k, v)| (&*k, v))
    }

    /// Visit all keys in unspecified order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Visit all values in unspecified order
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug, S> std::fmt::Debug for Map<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Hash-bucketed set
///
/// A [`Map`] with unit values.
#[derive(Clone)]
pub struct Set<K, S = DefaultBuildHasher> {
    map: Map<K, (), S>,
}

impl<K: Hash + Eq> Set<K> {
    /// Create a set with [`DEFAULT_CAPACITY`] buckets
    pub fn new() -> Self {
        Self { map: Map::new() }
    }

    /// Create a set with `capacity` buckets
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> CacheResult<Self> {
        Ok(Self {
            map: Map::with_capacity(capacity)?,
        })
    }
}

impl<K: Hash + Eq> Default for Set<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, S: BuildHasher> Set<K, S> {
    /// Create a set with `capacity` buckets hashing elements with `hasher`
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> CacheResult<Self> {
        Ok(Self {
            map: Map::with_capacity_and_hasher(capacity, hasher)?,
        })
    }

    /// Returns true if an element equal to `element` is present
    pub fn contains(&self, element: &K) -> bool {
        self.map.contains_key(element)
    }

    /// Insert an element, returning the equal element it replaced
    pub fn insert(&mut self, element: K) -> Option<K> {
        self.map.insert_entry(element, ()).map(|(k, _)| k)
    }

    /// Remove the element equal to `element`, returning the stored one
    pub fn remove(&mut self, element: &K) -> Option<K> {
        self.map.remove_entry(element).map(|(k, _)| k)
    }
}

impl<K, S> Set<K, S> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the set holds no elements
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Remove all elements
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Visit all elements in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }
}

impl<K: std::fmt::Debug, S> std::fmt::Debug for Set<K, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
