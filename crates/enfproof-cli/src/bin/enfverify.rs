//! enfverify - Ledger verification
//!
//! Recomputes every chain link of a user's stored proofs and checks the
//! recorded head. Any alteration, insertion or reordering of the history
//! surfaces here.
//!
//! Usage: enfverify --config service.toml <user_id>

use anyhow::Result;
use clap::Parser;
use enfproof_chain::verify_chain;
use enfproof_cli::output::{init_logger, print_json};
use enfproof_core::{PostgresStore, ProofStore, ServiceConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "enfverify")]
#[command(about = "Verify a user's proof chain", long_about = None)]
struct Args {
    /// User whose ledger to verify
    user_id: String,

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

    let proofs = store.user_proofs(&args.user_id).await?;
    let head = store.get_chain_head(&args.user_id).await?;

    let chain_error = verify_chain(&proofs).err().map(|e| e.to_string());
    let head_matches = match (&head, proofs.last()) {
        (Some(h), Some(last)) => h == &last.chain_hash,
        (None, None) => true,
        _ => false,
    };
    let ok = chain_error.is_none() && head_matches;

    log::info!(
        "verified {} proofs for {}: chain {}, head {}",
        proofs.len(),
        args.user_id,
        if chain_error.is_none() { "ok" } else { "BROKEN" },
        if head_matches { "ok" } else { "MISMATCH" },
    );

    let result = serde_json::json!({
        "status": if ok { "ok" } else { "broken" },
        "user_id": args.user_id,
        "proofs": proofs.len(),
        "chain_error": chain_error,
        "head_matches": head_matches,
    });
    print_json(&result)?;

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
