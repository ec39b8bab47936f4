//! `bidrec` - command-line front end for the bid reconciliation engine.
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bidrec_core::{Config, JsonFileGateway, PersistenceGateway};
use bidrec_engine::{Engine, SqliteGateway};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::Command;

/// Command-line arguments for bidrec
#[derive(Parser, Debug)]
#[command(name = "bidrec")]
#[command(about = "Bid reconciliation for construction projects")]
#[command(version)]
struct Cli {
    /// Store location; `.db`, `.sqlite` and `.sqlite3` files use SQLite, anything else JSON
    #[arg(short, long, global = true, default_value = "bidrec.json", env = "BIDREC_STORE")]
    store: PathBuf,

    /// JSON configuration file
    #[arg(short, long, global = true, env = "BIDREC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn is_sqlite(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    )
}

/// Run one command, then flush the store even if the command failed.
fn run<G: PersistenceGateway>(mut engine: Engine<G>, command: Command) -> Result<serde_json::Value> {
    let result = commands::execute(&mut engine, command);
    engine.shutdown().context("Failed to flush store")?;
    result
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bidrec=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    debug!(store = %cli.store.display(), "opening store");

    let output = if is_sqlite(&cli.store) {
        let gateway = SqliteGateway::open(&cli.store)
            .with_context(|| format!("Failed to open database {}", cli.store.display()))?;
        let engine = Engine::open(gateway, config).context("Failed to load store")?;
        run(engine, cli.command)?
    } else {
        let engine = Engine::open(JsonFileGateway::new(&cli.store), config)
            .context("Failed to load store")?;
        run(engine, cli.command)?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
