use std::path::PathBuf;

use anyhow::{
    Context,
    Result,
};
use clap::{
    Parser,
    Subcommand,
};
use shardroute::{
    config::{
        OtelConfig,
        RoutesFile,
        SentryConfig,
        TreeConfig,
    },
    observability,
    registry::{
        RouteContext,
        RouteRegistry,
    },
    routing_tree::RoutingTree,
};
use tracing::{
    error,
    info,
};

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Print the route and endpoint chosen for each key.
    Resolve {
        keys: Vec<String>,

        /// Route to a secondary replica instead of the primary.
        #[arg(long)]
        secondary: bool,
    },
    /// Exit non-zero unless the path is configured.
    Exists { path: String },
    /// List every configured leaf path.
    Paths,
    /// Remove paths and print the leaves that remain.
    Remove { paths: Vec<String> },
}

#[derive(Debug, Parser, Clone)]
#[command(name = "shardroute", about = "Resolve keys against a hierarchical consistent-hash routing tree.")]
struct Config {
    #[arg(long, env = "SHARDROUTE_ROUTES_FILE")]
    routes_file: PathBuf,

    /// Tree settings; a `tree` section in the routes file takes precedence.
    #[clap(flatten)]
    tree: TreeConfig,

    #[clap(flatten)]
    sentry: SentryConfig,

    #[clap(flatten)]
    otel: OtelConfig,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let config = Config::parse();
    let _sentry = observability::init_tracing_and_sentry(config.sentry.clone());

    if let Err(e) = observability::init_otel_metrics(config.otel.clone()) {
        error!("Failed to initialize OpenTelemetry metrics: {e}");
    }

    let routes = RoutesFile::load(&config.routes_file)
        .with_context(|| format!("Failed to load routes from {}", config.routes_file.display()))?;
    let tree_config = routes.tree.clone().unwrap_or_else(|| config.tree.clone());
    tree_config.validate()?;

    info!(tree = ?tree_config, routes = routes.routes.len(), "Building routing tree");

    let registry = RouteRegistry::new(RoutingTree::from_config(&tree_config)?);
    for (path, endpoints) in routes.routes {
        registry
            .register(&path, endpoints)
            .with_context(|| format!("Invalid route '{path}'"))?;
    }

    match config.command {
        Command::Resolve { keys, secondary } => {
            for key in keys {
                let context = if secondary {
                    RouteContext::secondary(key.as_str())
                } else {
                    RouteContext::primary(key.as_str())
                };
                match (registry.bind(&context)?, registry.select(&context)?) {
                    (Some(route), Some(endpoint)) => {
                        println!("{key}\t{}\t{endpoint}", route.lookup_key);
                    },
                    _ => println!("{key}\t<no route>"),
                }
            }
        },
        Command::Exists { path } => {
            if !registry.tree().path_exists(&path)? {
                anyhow::bail!("path '{path}' is not configured");
            }
            println!("{path}");
        },
        Command::Paths => {
            for path in registry.tree().paths()? {
                println!("{path}");
            }
        },
        Command::Remove { paths } => {
            for path in paths {
                if !registry.erase(&path, &[])? {
                    error!(path, "Route is in use and was not removed");
                }
            }
            for path in registry.tree().paths()? {
                println!("{path}");
            }
        },
    }

    Ok(())
}
