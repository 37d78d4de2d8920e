//! Local object storage: the set of names this node actually holds, and the
//! FIFO-bounded cache of names recently learned by forwarding `OBJECT`
//! replies through.

use std::collections::VecDeque;

use ahash::AHashSet;
use codec::Name;

#[derive(Debug, Default)]
pub struct ObjectStore {
    names: AHashSet<Name>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.names.contains(name)
    }

    pub fn insert(&mut self, name: Name) -> bool {
        self.names.insert(name)
    }

    pub fn remove(&mut self, name: &Name) -> bool {
        self.names.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A bounded FIFO of names seen in transit. Eviction is strict arrival
/// order, not LRU: a name that's looked up again doesn't get a second
/// lease on life.
#[derive(Debug)]
pub struct Cache {
    capacity: usize,
    order: VecDeque<Name>,
    members: AHashSet<Name>,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            members: AHashSet::new(),
        }
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.members.contains(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates cached names oldest-first, the order they'd be evicted in.
    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.order.iter()
    }

    /// Records a name, evicting the oldest entry first if the cache is at
    /// capacity. A name already present is not moved or duplicated.
    ///
    /// ```
    /// use ndn_node_forwarder::objects::Cache;
    ///
    /// let mut cache = Cache::new(2);
    /// cache.insert("a".parse().unwrap());
    /// cache.insert("b".parse().unwrap());
    /// cache.insert("c".parse().unwrap());
    ///
    /// assert!(!cache.contains(&"a".parse().unwrap()));
    /// assert!(cache.contains(&"b".parse().unwrap()));
    /// assert!(cache.contains(&"c".parse().unwrap()));
    /// ```
    pub fn insert(&mut self, name: Name) {
        if self.capacity == 0 || self.members.contains(&name) {
            return;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                log::debug!("cache at capacity ({}), evicting {oldest}", self.capacity);
                self.members.remove(&oldest);
            }
        }

        self.members.insert(name.clone());
        self.order.push_back(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_store_tracks_membership() {
        let mut store = ObjectStore::new();
        let name: Name = "photo".parse().unwrap();

        assert!(!store.contains(&name));
        assert!(store.insert(name.clone()));
        assert!(store.contains(&name));
        assert!(store.remove(&name));
        assert!(!store.contains(&name));
    }

    #[test]
    fn cache_evicts_oldest_first() {
        let mut cache = Cache::new(1);
        cache.insert("a".parse().unwrap());
        assert!(cache.contains(&"a".parse().unwrap()));

        cache.insert("b".parse().unwrap());
        assert!(!cache.contains(&"a".parse().unwrap()));
        assert!(cache.contains(&"b".parse().unwrap()));
    }

    #[test]
    fn zero_capacity_cache_never_retains_anything() {
        let mut cache = Cache::new(0);
        cache.insert("a".parse().unwrap());
        assert!(cache.is_empty());
    }
}
