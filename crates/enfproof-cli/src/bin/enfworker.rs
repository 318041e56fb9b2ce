//! enfworker - Proof processing worker
//!
//! Single-threaded claim/sleep loop. Run one process per worker; claim
//! atomicity at the database serializes them.
//!
//! Usage: enfworker --config service.toml

use anyhow::Result;
use clap::Parser;
use enfproof_cli::output::init_logger;
use enfproof_core::{run_worker, Collaborators, PostgresStore, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "enfworker")]
#[command(about = "Process queued clips into chained proofs", long_about = None)]
struct Args {
    /// Service config TOML
    #[arg(short, long, default_value = "service.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let config = ServiceConfig::load(&args.config)?;
    let store = PostgresStore::new(&config.storage.postgres, &config.storage.artifacts).await?;

    let collaborators = Collaborators::default_set();
    run_worker(Arc::new(store), &collaborators, &config).await
}
