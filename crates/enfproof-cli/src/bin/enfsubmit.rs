//! enfsubmit - Enqueue a clip for proof processing
//!
//! Plays the role of the upload layer from the command line: measures the
//! clip duration, stages the inputs, and creates a QUEUED job.
//!
//! Usage: enfsubmit --config service.toml <user_id> <audio> [frames...]

use anyhow::Result;
use clap::Parser;
use enfproof_cli::output::{init_logger, print_json};
use enfproof_core::audio;
use enfproof_core::{submit_clip, PostgresStore, ServiceConfig, SubmitRequest};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "enfsubmit")]
#[command(about = "Submit a clip to the proof queue", long_about = None)]
struct Args {
    /// Owning user identifier
    user_id: String,

    /// Audio or video clip to fingerprint
    audio_path: PathBuf,

    /// Reference frames (binary PGM), submission order
    frame_paths: Vec<PathBuf>,

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

    // Measure duration the way the worker will see it.
    let audio_data = audio::decode_audio(
        args.audio_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-UTF8 audio path"))?,
        &config.enf,
    )?;
    let duration_seconds = audio_data.duration_seconds();
    log::info!("clip duration {:.2}s", duration_seconds);

    let job = submit_clip(
        &store,
        std::path::Path::new(&config.intake.data_directory),
        &config.enf,
        SubmitRequest {
            user_id: args.user_id,
            audio_path: args.audio_path,
            duration_seconds,
            frame_paths: args.frame_paths,
        },
    )
    .await?;

    let result = serde_json::json!({
        "status": "queued",
        "job_id": job.id,
        "user_id": job.user_id,
        "duration_seconds": duration_seconds,
        "frames": job.frame_paths.len(),
    });
    print_json(&result)
}
