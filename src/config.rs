use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    hashing::HashAlgorithm,
    path::DEFAULT_PATH_SEPARATOR,
    registry::Endpoints,
    routing_tree::DEFAULT_REPLICAS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read routes file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Replica count must be at least 1")]
    ZeroReplicas,
}

#[derive(Debug, Parser, Clone)]
pub struct SentryConfig {
    #[arg(long, env = "SENTRY_DSN", default_value = "")]
    pub dsn: String,

    #[arg(long, env = "SENTRY_SAMPLE_RATE", default_value = "0.0")]
    pub sample_rate: f32,
}

#[derive(Debug, Parser, Clone)]
pub struct OtelConfig {
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = "")]
    pub endpoint: String,
}

/// How the routing tree hashes and joins its paths.
#[derive(Debug, Parser, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TreeConfig {
    #[arg(long, env = "SHARDROUTE_HASH_ALGORITHM", value_enum, default_value = "md5")]
    pub hash_algorithm: HashAlgorithm,

    /// Virtual nodes per child on every ring.
    #[arg(long, env = "SHARDROUTE_REPLICAS", default_value_t = DEFAULT_REPLICAS)]
    pub replicas: usize,

    #[arg(long, env = "SHARDROUTE_PATH_SEPARATOR", default_value_t = DEFAULT_PATH_SEPARATOR)]
    pub separator: char,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            replicas: DEFAULT_REPLICAS,
            separator: DEFAULT_PATH_SEPARATOR,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas == 0 {
            return Err(ConfigError::ZeroReplicas);
        }
        Ok(())
    }
}

/// Routes document, e.g.
///
/// ```json
/// {
///   "tree": { "hash_algorithm": "fnv1", "replicas": 67 },
///   "routes": {
///     "D1-S1-T1": { "primary": "pg://d1-primary", "secondaries": ["pg://d1-replica"] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesFile {
    #[serde(default)]
    pub tree: Option<TreeConfig>,
    pub routes: BTreeMap<String, Endpoints<String>>,
}

impl RoutesFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let file: RoutesFile = serde_json::from_str(contents)?;
        if let Some(tree) = &file.tree {
            tree.validate()?;
        }
        Ok(file)
    }
}
