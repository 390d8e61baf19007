//! Hierarchical consistent-hash routing.
//!
//! A [`RoutingTree`](routing_tree::RoutingTree) maps any key onto one leaf of
//! a multi-level namespace such as `database-shard-table`, using one
//! consistent hash ring per tree node so that adding or removing a branch
//! only moves a bounded share of keys.

pub mod config;
pub mod consistent_hashring;
pub mod hashing;
pub mod observability;
pub mod path;
pub mod prelude;
pub mod registry;
pub mod routing_tree;
