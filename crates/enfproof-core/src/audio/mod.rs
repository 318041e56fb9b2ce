//! Audio decoding and resampling
//!
//! WAV input is read with hound; every other supported container (MP3, AAC,
//! M4A, FLAC, OGG, and video containers carrying an audio track) goes
//! through Symphonia.

mod decoder;
mod resample;

pub use decoder::{decode_audio, AudioData};
pub use resample::resample_to_target;

use std::path::Path;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Wav,
    /// Anything Symphonia can probe: mp3, aac, m4a, flac, ogg, mp4, mkv,
    /// mov, webm.
    Container,
    Unknown,
}

impl MediaFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("wav") | Some("wave") => MediaFormat::Wav,
            Some("mp3") | Some("aac") | Some("m4a") | Some("flac") | Some("ogg")
            | Some("mp4") | Some("m4v") | Some("mkv") | Some("mov") | Some("webm") => {
                MediaFormat::Container
            }
            _ => MediaFormat::Unknown,
        }
    }
}
