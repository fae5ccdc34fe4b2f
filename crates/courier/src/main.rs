// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier operator CLI.
//!
//! Inspects and repairs the local outbox and the response cache stored in the
//! configured SQLite database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cache;
mod resend;
mod shutdown;
mod status;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use courier_config::model::CourierConfig;
use courier_core::CourierError;
use courier_storage::Database;
use tracing::debug;

/// Courier - inspect and repair message delivery and the response cache.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show pending and failed outgoing messages.
    Status {
        /// Output JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Return a failed message to the outbox.
    Resend {
        /// Local id of the failed message.
        local_id: String,
    },
    /// Inspect or clean the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Entry counts, access totals and the most-used keys.
    Stats {
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete every expired entry.
    Sweep,
    /// Sweep expired entries periodically until interrupted.
    Janitor,
    /// Delete every entry whose key starts with PREFIX.
    Invalidate {
        /// Key prefix, e.g. `conversation:c1:`.
        prefix: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match courier_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.client.log_level);
    courier_outbox::register_metrics();
    courier_cache::register_metrics();

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &CourierConfig) -> Result<(), CourierError> {
    let db = open_database(config).await?;
    match command {
        Commands::Status { json, plain } => status::run_status(db, config, json, plain).await,
        Commands::Resend { local_id } => resend::run_resend(db, config, &local_id.into()).await,
        Commands::Cache { action } => match action {
            CacheCommand::Stats { json } => cache::run_stats(db, config, json).await,
            CacheCommand::Sweep => cache::run_sweep(db, config).await,
            CacheCommand::Janitor => {
                cache::run_janitor(db, config, shutdown::install_signal_handler()).await
            }
            CacheCommand::Invalidate { prefix } => cache::run_invalidate(db, config, &prefix).await,
        },
    }
}

async fn open_database(config: &CourierConfig) -> Result<Arc<Database>, CourierError> {
    debug!(path = %config.storage.database_path, "opening database");
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    Ok(Arc::new(db))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
