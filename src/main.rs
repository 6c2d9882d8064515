use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gitspace::config::StoreConfig;
use gitspace::context::Context;
use gitspace::store::{PathStore, SqliteStore};
use gitspace::types::PathFilter;

#[derive(Parser)]
#[command(name = "gitspace")]
#[command(about = "Namespace and membership store administration", long_about = None)]
struct Cli {
    /// TOML file with store settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding the database; overrides the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init,

    /// Show the resource a path points at, with all of its paths
    Resolve {
        /// Path to resolve, e.g. "acme/web"
        path: String,
    },
}

fn load_config(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<StoreConfig> {
    let mut config = match config {
        Some(path) => StoreConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

fn run_init(config: &StoreConfig) -> anyhow::Result<()> {
    let store = SqliteStore::open(config)?;
    store.initialize()?;

    info!("Initialized database at {}", config.db_path().display());
    Ok(())
}

fn run_resolve(config: &StoreConfig, path: &str) -> anyhow::Result<()> {
    if !config.db_path().exists() {
        anyhow::bail!(
            "No database at {}. Run 'gitspace init' first.",
            config.db_path().display()
        );
    }

    let store = SqliteStore::open(config)?;
    let ctx = Context::background();

    let target = store.resolve(&ctx, path)?;
    let paths = store.list_paths(
        &ctx,
        target,
        &PathFilter {
            page: 1,
            size: config.max_page_size,
        },
    )?;

    let output = json!({
        "kind": target.kind,
        "id": target.id,
        "paths": paths
            .iter()
            .map(|p| json!({ "value": p.value, "primary": p.is_primary }))
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gitspace=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Resolve { path } => run_resolve(&config, &path)?,
    }

    Ok(())
}
