//! enfextract - One-shot ENF extraction
//!
//! Decodes a media file, extracts the ENF trace, and prints the result as
//! JSON. Optionally writes the rendered trace next to it.
//!
//! Usage: enfextract <input_media_path> [--trace-out trace.svg]

use anyhow::{Context, Result};
use clap::Parser;
use enfproof_cli::output::{init_logger, print_json};
use enfproof_core::collab::{SvgTraceRenderer, TraceRenderer};
use enfproof_core::{extract_enf_from_file, EnfConfig, ServiceConfig};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "enfextract")]
#[command(about = "Extract an ENF trace from a media clip", long_about = None)]
struct Args {
    /// Input media file (wav, mp3, m4a, flac, ogg, mp4, ...)
    input_path: String,

    /// Service config TOML; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Nominal mains frequency override (50 or 60)
    #[arg(long)]
    nominal_hz: Option<f64>,

    /// Write the rendered trace to this path
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut config: EnfConfig = match &args.config {
        Some(path) => ServiceConfig::load(path)?.enf,
        None => EnfConfig::default(),
    };
    if let Some(hz) = args.nominal_hz {
        config.nominal_hz = hz;
    }
    config.validate()?;

    if !Path::new(&args.input_path).exists() {
        anyhow::bail!("Input file not found: {}", args.input_path);
    }

    log::info!("Processing: {}", args.input_path);
    let start = std::time::Instant::now();
    let series = extract_enf_from_file(&args.input_path, &config)?;
    let elapsed = start.elapsed();

    log::info!(
        "Extracted {} trace points in {:.2}s (quality {:.1})",
        series.frequencies.len(),
        elapsed.as_secs_f64(),
        series.quality
    );

    if let Some(trace_out) = &args.trace_out {
        let trace = SvgTraceRenderer.render(&series)?;
        std::fs::write(trace_out, &trace.bytes)
            .with_context(|| format!("Failed to write {}", trace_out.display()))?;
        log::info!("Wrote trace to {}", trace_out.display());
    }

    let result = serde_json::json!({
        "status": "success",
        "input_file": args.input_path,
        "nominal_hz": config.nominal_hz,
        "enf_hash": series.content_hash,
        "quality": series.quality,
        "freq_mean": series.freq_mean,
        "freq_std": series.freq_std,
        "trace_points": series.frequencies.len(),
        "low_confidence": series.low_confidence,
        "processing_time_seconds": elapsed.as_secs_f64(),
    });
    print_json(&result)
}
