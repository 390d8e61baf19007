use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    fmt,
    num::NonZeroUsize,
    sync::Arc,
};

use tracing::debug;

use crate::hashing::HashFunction;

/// Joins a member id and its replica index into a virtual node key.
const VIRTUAL_NODE_LINKER: &str = "#";

/// A consistent hash ring implementation.
///
/// This structure maps keys to members in a way that minimizes redistribution
/// when members are added or removed. Each member occupies up to `replicas`
/// positions; two virtual nodes hashing to the same ordinal overwrite each
/// other and the member simply ends up with fewer positions.
#[derive(Clone)]
pub struct ConsistentHashRing<T = String>
where
    T: Clone + Eq + AsRef<[u8]>,
{
    /// The virtual nodes in the ring, mapping hash positions to member
    /// identifiers.
    ring: BTreeMap<u64, T>,

    /// The number of virtual nodes per member.
    replicas: NonZeroUsize,

    hasher: Arc<dyn HashFunction>,
}

impl<T> ConsistentHashRing<T>
where
    T: Clone + Eq + AsRef<[u8]>,
{
    /// Create a new consistent hash ring with the specified number of virtual
    /// nodes per member.
    pub fn new(replicas: NonZeroUsize, hasher: Arc<dyn HashFunction>) -> Self {
        ConsistentHashRing {
            ring: BTreeMap::new(),
            replicas,
            hasher,
        }
    }

    pub fn with_nodes(replicas: NonZeroUsize, hasher: Arc<dyn HashFunction>, nodes: impl IntoIterator<Item = T>) -> Self {
        let mut ring = Self::new(replicas, hasher);
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    /// Add a member to the hash ring. Adding it again re-asserts the same
    /// positions.
    pub fn add_node(&mut self, node: T) {
        for i in 0..self.replicas.get() {
            let key = self.vnode_position(&node, i);
            self.ring.insert(key, node.clone());
        }
        debug!(replicas = self.replicas.get(), vnodes = self.ring.len(), "added member to ring");
    }

    /// Remove a member from the hash ring. Unknown members are ignored.
    pub fn remove_node(&mut self, node: &T) {
        for i in 0..self.replicas.get() {
            let key = self.vnode_position(node, i);
            if self.ring.get(&key) == Some(node) {
                self.ring.remove(&key);
            }
        }
        debug!(replicas = self.replicas.get(), vnodes = self.ring.len(), "removed member from ring");
    }

    /// Get the member responsible for the given key.
    ///
    /// The owner is the member at the first position at or after the key's
    /// hash, wrapping around to the lowest position.
    pub fn get_node<K>(&self, key: &K) -> Option<T>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        if self.ring.is_empty() {
            return None;
        }

        let key_hash = self.hasher.hash(key.as_ref());
        match self.ring.range(key_hash..).next() {
            Some((_, node)) => Some(node.clone()),
            None => self.ring.values().next().cloned(),
        }
    }

    pub fn contains_node(&self, node: &T) -> bool {
        self.ring.values().any(|n| n == node)
    }

    /// Number of distinct members that still own at least one position.
    pub fn node_count(&self) -> usize {
        self.ring
            .values()
            .map(AsRef::as_ref)
            .collect::<BTreeSet<&[u8]>>()
            .len()
    }

    pub fn vnode_count(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn replicas(&self) -> usize {
        self.replicas.get()
    }

    fn vnode_position(&self, node: &T, index: usize) -> u64 {
        let node = node.as_ref();
        let suffix = index.to_string();
        let mut key = Vec::with_capacity(node.len() + VIRTUAL_NODE_LINKER.len() + suffix.len());
        key.extend_from_slice(node);
        key.extend_from_slice(VIRTUAL_NODE_LINKER.as_bytes());
        key.extend_from_slice(suffix.as_bytes());
        self.hasher.hash(&key)
    }
}

impl<T> fmt::Debug for ConsistentHashRing<T>
where
    T: Clone + Eq + AsRef<[u8]>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistentHashRing")
            .field("replicas", &self.replicas)
            .field("vnodes", &self.ring.len())
            .finish()
    }
}
