#![allow(dead_code)]

use std::sync::Arc;

use shardroute::{
    hashing::HashFunction,
    routing_tree::RoutingTree,
};

/// Folds the key into a small keyspace so ring positions are easy to reason
/// about in tests.
#[derive(Debug, Clone, Copy)]
pub struct ModuloHash {
    pub modulus: u64,
}

impl HashFunction for ModuloHash {
    fn hash(&self, key: &[u8]) -> u64 {
        key.iter()
            .fold(0u64, |acc, &b| (acc.wrapping_mul(31).wrapping_add(u64::from(b))) % self.modulus)
    }
}

pub fn modulo_tree(replicas: usize) -> RoutingTree {
    RoutingTree::new(Arc::new(ModuloHash { modulus: 1024 }), replicas, '-').unwrap()
}

pub fn tree_with(paths: &[&str]) -> RoutingTree {
    let tree = RoutingTree::default();
    for path in paths {
        tree.add_path(path).expect("valid path");
    }
    tree
}

pub fn leaf_of(route: &str) -> &str {
    route.strip_suffix('-').unwrap_or(route)
}
