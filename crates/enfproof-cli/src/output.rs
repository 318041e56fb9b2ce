//! JSON output helpers
//!
//! Every binary prints a single JSON document on stdout so results are
//! machine-parseable; logs go to stderr via env_logger.

use anyhow::Result;
use serde::Serialize;

/// Pretty-print a result document to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize logging: silent by default, Info with `--verbose`.
pub fn init_logger(verbose: bool) {
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Off)
            .init();
    }
}
