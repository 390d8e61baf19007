pub use crate::config::{
    ConfigError, OtelConfig, RoutesFile, SentryConfig, TreeConfig,
};

pub use crate::consistent_hashring::ConsistentHashRing;

pub use crate::hashing::{Fnv1Hash, HashAlgorithm, HashFunction, Md5Hash};

pub use crate::registry::{
    ActiveRoute, Endpoints, RegistryError, Replica, RouteContext, RouteRegistry,
};

pub use crate::routing_tree::{RoutingTree, TreeError, DEFAULT_REPLICAS, ROOT_KEY};
