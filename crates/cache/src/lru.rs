//! Bounded insertion-ordered containers
//!
//! [`LruSet`] and [`LruMap`] hold at most `capacity` entries in a fixed
//! circular buffer, oldest first. Inserting into a full container evicts the
//! oldest entry and hands it back to the caller. Recency is insertion
//! recency: re-inserting an existing entry moves it to the newest position,
//! while lookups leave the order untouched.
//!
//! Entries are found by equality alone with a linear scan, so removal and
//! lookup are O(n) in the current size.

/// Circular buffer of up to `slots.len()` entries starting at `head`
#[derive(Clone)]
struct Ring<E> {
    slots: Vec<Option<E>>,
    head: usize,
    len: usize,
}

impl<E> Ring<E> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Physical slot of the `i`-th oldest entry
    fn slot(&self, i: usize) -> usize {
        (self.head + i) % self.slots.len()
    }

    fn get(&self, i: usize) -> Option<&E> {
        self.slots[self.slot(i)].as_ref()
    }

    fn get_mut(&mut self, i: usize) -> Option<&mut E> {
        let slot = self.slot(i);
        self.slots[slot].as_mut()
    }

    fn position<P: FnMut(&E) -> bool>(&self, mut predicate: P) -> Option<usize> {
        (0..self.len).find(|&i| self.get(i).is_some_and(&mut predicate))
    }

    /// Remove the `i`-th oldest entry, closing the gap behind it
    fn remove_at(&mut self, i: usize) -> Option<E> {
        let slot = self.slot(i);
        let removed = self.slots[slot].take();
        for j in i..self.len - 1 {
            let from = self.slot(j + 1);
            let to = self.slot(j);
            self.slots[to] = self.slots[from].take();
        }
        self.len -= 1;
        removed
    }

    /// Append as newest, evicting the oldest entry if full
    ///
    /// Must not be called with zero capacity.
    fn push(&mut self, entry: E) -> Option<E> {
        let mut evicted = None;
        if self.len == self.capacity() {
            evicted = self.slots[self.head].take();
            self.head = self.slot(1);
            self.len -= 1;
        }
        let slot = self.slot(self.len);
        self.slots[slot] = Some(entry);
        self.len += 1;
        evicted
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    fn iter(&self) -> impl Iterator<Item = &E> {
        (0..self.len).filter_map(move |i| self.get(i))
    }
}

/// Bounded set evicting its oldest element on overflow
///
/// # Example
///
/// ```
/// use panoview_cache::LruSet;
///
/// let mut set = LruSet::new(2);
/// assert_eq!(set.insert("a"), None);
/// assert_eq!(set.insert("b"), None);
/// assert_eq!(set.insert("c"), Some("a"));
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Clone)]
pub struct LruSet<T> {
    ring: Ring<T>,
}

impl<T: PartialEq> LruSet<T> {
    /// Create a set holding at most `capacity` elements
    ///
    /// A zero capacity set rejects every insertion.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Ring::new(capacity),
        }
    }

    /// Insert `element` as the newest member
    ///
    /// An element equal to one already present replaces it and moves to the
    /// newest position. Returns the evicted oldest element if the set was
    /// full, or `element` itself if the capacity is zero.
    pub fn insert(&mut self, element: T) -> Option<T> {
        if self.ring.capacity() == 0 {
            return Some(element);
        }
        self.remove(&element);
        self.ring.push(element)
    }

    /// Remove the element equal to `element`, returning the stored one
    pub fn remove(&mut self, element: &T) -> Option<T> {
        let i = self.ring.position(|e| e == element)?;
        self.ring.remove_at(i)
    }

    /// Returns true if an element equal to `element` is present
    pub fn contains(&self, element: &T) -> bool {
        self.ring.position(|e| e == element).is_some()
    }
}

impl<T> LruSet<T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        self.ring.len
    }

    /// Returns true if the set holds no elements
    pub fn is_empty(&self) -> bool {
        self.ring.len == 0
    }

    /// Maximum number of elements
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Remove all elements
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Visit elements oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ring.iter()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LruSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Bounded map evicting its oldest entry on overflow
#[derive(Clone)]
pub struct LruMap<K, V> {
    ring: Ring<(K, V)>,
}

impl<K: PartialEq, V> LruMap<K, V> {
    /// Create a map holding at most `capacity` entries
    ///
    /// A zero capacity map rejects every insertion.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Ring::new(capacity),
        }
    }

    /// Insert an entry as the newest one
    ///
    /// An existing entry for `key` is replaced and moves to the newest
    /// position. Returns the evicted oldest entry if the map was full, or the
    /// attempted entry itself if the capacity is zero.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.ring.capacity() == 0 {
            return Some((key, value));
        }
        self.remove(&key);
        self.ring.push((key, value))
    }

    /// Returns the value stored for `key` without refreshing its position
    pub fn get(&self, key: &K) -> Option<&V> {
        let i = self.ring.position(|(k, _)| k == key)?;
        self.ring.get(i).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored for `key`
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let i = self.ring.position(|(k, _)| k == key)?;
        self.ring.get_mut(i).map(|(_, v)| v)
    }

    /// Returns true if an entry for `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.ring.position(|(k, _)| k == key).is_some()
    }

    /// Remove the entry for `key`, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.ring.position(|(k, _)| k == key)?;
        self.ring.remove_at(i).map(|(_, v)| v)
    }
}

impl<K, V> LruMap<K, V> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.ring.len
    }

    /// Returns true if the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.ring.len == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Visit entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.ring.iter().map(|(k, v)| (k, v))
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for LruMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
