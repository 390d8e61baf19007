//! Binds routing-tree leaves to the endpoints that serve them.
//!
//! The active route of a request is an explicit [`ActiveRoute`] value handed
//! back to the caller, who passes it along (and back into [`RouteRegistry::erase`])
//! instead of the registry keeping per-thread state.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{
    debug,
    info,
};

use crate::{
    hashing::HashFunction,
    routing_tree::{
        RoutingTree,
        TreeError,
    },
};

const PRIMARY_SUFFIX: &str = "master";
const SECONDARY_SUFFIX: &str = "slave";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Routing tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("No endpoints registered for route '{0}'")]
    UnboundRoute(String),
    #[error("Endpoint registry lock poisoned")]
    LockPoisoned,
}

/// A primary endpoint and its read replicas.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Endpoints<T> {
    pub primary: T,
    #[serde(default)]
    pub secondaries: Vec<T>,
}

impl<T> Endpoints<T> {
    pub fn new(primary: T) -> Self {
        Self {
            primary,
            secondaries: Vec::new(),
        }
    }

    pub fn with_secondaries(primary: T, secondaries: Vec<T>) -> Self {
        Self { primary, secondaries }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replica {
    Primary,
    Secondary,
}

/// What a caller wants routed: the routing key and which replica to hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteContext {
    pub key: String,
    pub replica: Replica,
}

impl RouteContext {
    pub fn primary(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            replica: Replica::Primary,
        }
    }

    pub fn secondary(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            replica: Replica::Secondary,
        }
    }
}

/// A resolved route held by an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRoute {
    /// Resolved leaf path, including the trailing separator.
    pub path: String,
    /// Endpoint lookup key, e.g. `D1-S1-T1-master`.
    pub lookup_key: String,
    pub replica: Replica,
}

pub struct RouteRegistry<T> {
    tree: RoutingTree,
    endpoints: RwLock<HashMap<String, Endpoints<T>>>,
}

impl<T: Clone> RouteRegistry<T> {
    pub fn new(tree: RoutingTree) -> Self {
        Self {
            tree,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn tree(&self) -> &RoutingTree {
        &self.tree
    }

    /// Add `path` to the tree and bind it to `endpoints`, replacing any
    /// previous binding.
    pub fn register(&self, path: &str, endpoints: Endpoints<T>) -> Result<(), RegistryError> {
        self.tree.add_path(path)?;
        let key = self.canonical(path);
        self.endpoints
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?
            .insert(key, endpoints);
        info!(path, "registered route endpoints");
        Ok(())
    }

    /// Resolve the context's key into a route. `None` when no route exists.
    pub fn bind(&self, context: &RouteContext) -> Result<Option<ActiveRoute>, RegistryError> {
        let Some(path) = self.tree.resolve(&context.key)? else {
            return Ok(None);
        };

        let suffix = match context.replica {
            Replica::Primary => PRIMARY_SUFFIX,
            Replica::Secondary => SECONDARY_SUFFIX,
        };
        let lookup_key = format!("{path}{suffix}");
        debug!(key = %context.key, %lookup_key, "bound route");

        Ok(Some(ActiveRoute {
            path,
            lookup_key,
            replica: context.replica,
        }))
    }

    /// The endpoint that should serve `context`.
    ///
    /// Secondary requests pick one replica by hashing the key and fall back to
    /// the primary when the route has no replicas.
    pub fn select(&self, context: &RouteContext) -> Result<Option<T>, RegistryError> {
        let Some(route) = self.bind(context)? else {
            return Ok(None);
        };

        let key = self.canonical(&route.path);
        let endpoints = self.endpoints.read().map_err(|_| RegistryError::LockPoisoned)?;
        let bound = endpoints
            .get(&key)
            .ok_or_else(|| RegistryError::UnboundRoute(key.clone()))?;

        let endpoint = match context.replica {
            Replica::Secondary if !bound.secondaries.is_empty() => {
                let ordinal = self.tree.hasher().hash(context.key.as_bytes());
                let index = (ordinal % bound.secondaries.len() as u64) as usize;
                bound.secondaries[index].clone()
            },
            _ => bound.primary.clone(),
        };
        Ok(Some(endpoint))
    }

    /// Take `path` out of the routing tree unless an in-flight route is under
    /// it, in which case nothing changes and `false` is returned so the caller
    /// can retry later.
    ///
    /// Endpoint bindings are kept, so registering the path again revives it.
    pub fn erase(&self, path: &str, active: &[ActiveRoute]) -> Result<bool, RegistryError> {
        let prefix = self.canonical(path);
        let separator = self.tree.separator();
        let in_use = active.iter().any(|route| {
            let route_path = route.path.strip_suffix(separator).unwrap_or(&route.path);
            route_path == prefix || route_path.starts_with(&format!("{prefix}{separator}"))
        });

        if in_use {
            info!(path, "route is in use, not erasing");
            return Ok(false);
        }

        self.tree.remove_path(path)?;
        Ok(true)
    }

    fn canonical(&self, path: &str) -> String {
        path.strip_suffix(self.tree.separator()).unwrap_or(path).to_string()
    }
}
