//! Hierarchical routing tree with one consistent hash ring per node.
//!
//! Every node dispatches among its children through its own ring, so
//! resolving a key is a walk from the root where each level independently
//! reduces the same input key. Nodes live in an arena and refer to their
//! parent by index, which keeps upward pruning O(1) per level.

use std::{
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::{
        Arc,
        RwLock,
        RwLockReadGuard,
        RwLockWriteGuard,
    },
};

use thiserror::Error;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::{
    config::TreeConfig,
    consistent_hashring::ConsistentHashRing,
    hashing::{
        HashFunction,
        Md5Hash,
    },
    observability::TreeMetrics,
    path::{
        DEFAULT_PATH_SEPARATOR,
        split_path,
    },
};

pub const ROOT_KEY: &str = "ROOT";
pub const DEFAULT_REPLICAS: usize = 13;

const DEFAULT_RING_REPLICAS: NonZeroUsize = match NonZeroUsize::new(DEFAULT_REPLICAS) {
    Some(replicas) => replicas,
    None => panic!("DEFAULT_REPLICAS must be non-zero"),
};

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Path is empty")]
    EmptyPath,
    #[error("Path '{path}' contains an empty level")]
    EmptyLevel { path: String },
    #[error("Routing tree is inconsistent: {0}")]
    Inconsistent(String),
    #[error("Routing tree lock poisoned")]
    LockPoisoned,
    #[error("Replica count must be at least 1")]
    ZeroReplicas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

struct RoutingNode {
    key: String,
    parent: Option<NodeId>,
    children: HashMap<String, NodeId>,
    /// Dispatches among `children` by child key; populated iff `children` is.
    ring: ConsistentHashRing<String>,
}

impl RoutingNode {
    fn new(key: String, parent: Option<NodeId>, replicas: NonZeroUsize, hasher: Arc<dyn HashFunction>) -> Self {
        Self {
            key,
            parent,
            children: HashMap::new(),
            ring: ConsistentHashRing::new(replicas, hasher),
        }
    }
}

/// Slot storage for nodes. Freed slots are reused by later insertions.
struct Arena {
    slots: Vec<Option<RoutingNode>>,
    free: Vec<usize>,
    replicas: NonZeroUsize,
    hasher: Arc<dyn HashFunction>,
}

impl Arena {
    fn new(replicas: NonZeroUsize, hasher: Arc<dyn HashFunction>) -> Self {
        let root = RoutingNode::new(ROOT_KEY.to_string(), None, replicas, hasher.clone());
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            replicas,
            hasher,
        }
    }

    fn node(&self, id: NodeId) -> Result<&RoutingNode, TreeError> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| TreeError::Inconsistent(format!("dangling node handle {}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut RoutingNode, TreeError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| TreeError::Inconsistent(format!("dangling node handle {}", id.0)))
    }

    fn child(&self, parent: NodeId, key: &str) -> Result<Option<NodeId>, TreeError> {
        Ok(self.node(parent)?.children.get(key).copied())
    }

    fn alloc(&mut self, node: RoutingNode) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            },
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            },
        }
    }

    /// Create `key` under `parent`, registering it in the parent's ring.
    fn attach(&mut self, parent: NodeId, key: &str) -> Result<NodeId, TreeError> {
        let node = RoutingNode::new(key.to_string(), Some(parent), self.replicas, self.hasher.clone());
        let id = self.alloc(node);

        let parent_node = self.node_mut(parent)?;
        parent_node.children.insert(key.to_string(), id);
        parent_node.ring.add_node(key.to_string());
        Ok(id)
    }

    /// Unlink `id` from its parent and release its whole subtree. Returns the
    /// parent handle.
    fn detach(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let (key, parent) = {
            let node = self.node(id)?;
            let parent = node
                .parent
                .ok_or_else(|| TreeError::Inconsistent("attempted to detach the root".to_string()))?;
            (node.key.clone(), parent)
        };

        let parent_node = self.node_mut(parent)?;
        parent_node.children.remove(&key);
        parent_node.ring.remove_node(&key);
        self.release(id)?;
        Ok(parent)
    }

    fn release(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = self
                .slots
                .get_mut(current.0)
                .and_then(Option::take)
                .ok_or_else(|| TreeError::Inconsistent(format!("node {} released twice", current.0)))?;
            pending.extend(node.children.into_values());
            self.free.push(current.0);
        }
        Ok(())
    }

    /// Follow `levels` from the root by exact key match.
    fn find(&self, levels: &[&str]) -> Result<Option<NodeId>, TreeError> {
        let mut current = ROOT;
        for level in levels {
            match self.child(current, level)? {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn insert(&mut self, levels: &[&str]) -> Result<bool, TreeError> {
        let mut current = ROOT;
        let mut created = false;
        for level in levels {
            current = match self.child(current, level)? {
                Some(id) => id,
                None => {
                    created = true;
                    self.attach(current, level)?
                },
            };
        }
        Ok(created)
    }

    fn leaf_paths(&self, separator: char) -> Result<Vec<String>, TreeError> {
        let mut paths = Vec::new();
        let mut pending: Vec<(NodeId, String)> = vec![(ROOT, String::new())];
        while let Some((id, prefix)) = pending.pop() {
            let node = self.node(id)?;
            if node.children.is_empty() {
                if id != ROOT {
                    paths.push(prefix);
                }
                continue;
            }
            for (key, &child) in &node.children {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{separator}{key}")
                };
                pending.push((child, path));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Routes arbitrary keys to leaves of a multi-level namespace.
///
/// Readers (`resolve`, `path_exists`, `paths`) share the tree lock; writers
/// (`add_path`, `remove_path`, `rebuild`) hold it exclusively, so a node's
/// children and ring always change together.
pub struct RoutingTree {
    arena: RwLock<Arena>,
    hasher: Arc<dyn HashFunction>,
    replicas: NonZeroUsize,
    separator: char,
    metrics: TreeMetrics,
}

impl RoutingTree {
    /// Build an empty tree. Every ring places `replicas` virtual nodes per
    /// child, so zero is rejected.
    pub fn new(hasher: Arc<dyn HashFunction>, replicas: usize, separator: char) -> Result<Self, TreeError> {
        let replicas = NonZeroUsize::new(replicas).ok_or(TreeError::ZeroReplicas)?;
        Ok(Self::with_replicas(hasher, replicas, separator))
    }

    pub fn with_replicas(hasher: Arc<dyn HashFunction>, replicas: NonZeroUsize, separator: char) -> Self {
        Self {
            arena: RwLock::new(Arena::new(replicas, hasher.clone())),
            hasher,
            replicas,
            separator,
            metrics: TreeMetrics::new(),
        }
    }

    pub fn from_config(config: &TreeConfig) -> Result<Self, TreeError> {
        Self::new(config.hash_algorithm.hasher(), config.replicas, config.separator)
    }

    pub fn hasher(&self) -> &Arc<dyn HashFunction> {
        &self.hasher
    }

    pub fn replicas(&self) -> usize {
        self.replicas.get()
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Insert every level of `path` that is not already present.
    ///
    /// Returns `true` when at least one node was created.
    pub fn add_path(&self, path: &str) -> Result<bool, TreeError> {
        let levels = split_path(path, self.separator)?;
        let created = self.write()?.insert(&levels)?;
        if created {
            info!(path, "added routing path");
            self.metrics.record_mutation("add");
        } else {
            debug!(path, "routing path already present");
        }
        Ok(created)
    }

    /// Remove the node named by `path` together with its subtree, then prune
    /// every ancestor left without children. The root is never pruned.
    ///
    /// Returns `false` when the path does not exist.
    pub fn remove_path(&self, path: &str) -> Result<bool, TreeError> {
        let levels = split_path(path, self.separator)?;
        let mut arena = self.write()?;

        let Some(target) = arena.find(&levels)? else {
            debug!(path, "routing path not found, nothing to remove");
            return Ok(false);
        };

        let mut current = arena.detach(target)?;
        while current != ROOT && arena.node(current)?.children.is_empty() {
            debug!(key = %arena.node(current)?.key, "pruning empty routing node");
            current = arena.detach(current)?;
        }

        info!(path, "removed routing path");
        self.metrics.record_mutation("remove");
        Ok(true)
    }

    /// Resolve `key` to a full leaf path, e.g. `D1-S1-T1-`.
    ///
    /// Returns `None` when no path has been configured.
    pub fn resolve<K>(&self, key: &K) -> Result<Option<String>, TreeError>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        let arena = self.read()?;
        let mut node = arena.node(ROOT)?;
        if node.children.is_empty() {
            warn!("resolving against an empty routing tree");
            self.metrics.record_resolve("miss");
            return Ok(None);
        }

        let mut path = String::new();
        loop {
            let child_key = node.ring.get_node(key).ok_or_else(|| {
                self.inconsistent(format!("node '{}' has children but an empty ring", node.key))
            })?;
            let child_id = node.children.get(&child_key).copied().ok_or_else(|| {
                self.inconsistent(format!("ring of '{}' points at missing child '{child_key}'", node.key))
            })?;

            path.push_str(&child_key);
            path.push(self.separator);

            let child = arena.node(child_id)?;
            if child.children.is_empty() {
                break;
            }
            node = child;
        }

        self.metrics.record_resolve("hit");
        Ok(Some(path))
    }

    pub fn path_exists(&self, path: &str) -> Result<bool, TreeError> {
        let levels = split_path(path, self.separator)?;
        Ok(self.read()?.find(&levels)?.is_some())
    }

    /// All leaf paths, sorted, without a trailing separator.
    pub fn paths(&self) -> Result<Vec<String>, TreeError> {
        self.read()?.leaf_paths(self.separator)
    }

    pub fn is_empty(&self) -> Result<bool, TreeError> {
        Ok(self.read()?.node(ROOT)?.children.is_empty())
    }

    /// Replace the whole tree with `paths`. Nothing changes if any path is
    /// malformed.
    pub fn rebuild<I, S>(&self, paths: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths: Vec<S> = paths.into_iter().collect();
        let parsed = paths
            .iter()
            .map(|p| split_path(p.as_ref(), self.separator))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fresh = Arena::new(self.replicas, self.hasher.clone());
        for levels in &parsed {
            fresh.insert(levels)?;
        }

        *self.write()? = fresh;
        info!(paths = parsed.len(), "rebuilt routing tree");
        self.metrics.record_mutation("rebuild");
        Ok(())
    }

    fn inconsistent(&self, message: String) -> TreeError {
        error!(%message, "routing tree invariant violated");
        TreeError::Inconsistent(message)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Arena>, TreeError> {
        self.arena.read().map_err(|_| TreeError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Arena>, TreeError> {
        self.arena.write().map_err(|_| TreeError::LockPoisoned)
    }
}

impl Default for RoutingTree {
    fn default() -> Self {
        Self::with_replicas(Arc::new(Md5Hash), DEFAULT_RING_REPLICAS, DEFAULT_PATH_SEPARATOR)
    }
}

impl fmt::Debug for RoutingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTree")
            .field("replicas", &self.replicas)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}
