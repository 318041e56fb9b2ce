//! Media decoding to mono-foldable PCM

use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::MediaFormat;
use crate::config::EnfConfig;
use crate::error::ExtractError;

/// Decoded audio data
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);
        for frame in self.samples.chunks(self.channels as usize) {
            let avg: f32 = frame.iter().sum::<f32>() / frame.len() as f32;
            mono.push(avg);
        }
        mono
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let duration_ms =
            (samples.len() as f64 / (sample_rate as f64 * channels as f64) * 1000.0) as u32;
        Self {
            samples,
            sample_rate,
            channels,
            duration_ms,
        }
    }
}

/// Decode a media file to PCM.
///
/// Decoding stops once `max_seconds` plus a one-second margin worth of
/// samples have been produced; there is no subprocess to time out, so the
/// cap is what bounds a malformed never-ending stream. A capped clip fails
/// the duration gate downstream as `ClipTooLong`.
pub fn decode_audio(path: &str, config: &EnfConfig) -> Result<AudioData, ExtractError> {
    let path = Path::new(path);

    if !path.is_file() {
        return Err(ExtractError::InputMissing(path.display().to_string()));
    }

    match MediaFormat::from_path(path) {
        MediaFormat::Wav => decode_wav(path, config),
        // Unknown extensions still get a probe: Symphonia identifies most
        // containers from their magic bytes.
        MediaFormat::Container | MediaFormat::Unknown => decode_with_symphonia(path, config),
    }
}

/// Per-channel sample cap for a decode run.
fn sample_cap(config: &EnfConfig, sample_rate: u32, channels: u16) -> usize {
    ((config.max_seconds + 1.0) * sample_rate as f64) as usize * channels.max(1) as usize
}

/// Decode WAV with hound
fn decode_wav(path: &Path, config: &EnfConfig) -> Result<AudioData, ExtractError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| ExtractError::Decode(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    let cap = sample_cap(config, spec.sample_rate, spec.channels);

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .take(cap)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExtractError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .take(cap)
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ExtractError::Decode(e.to_string()))?
        }
    };

    Ok(AudioData::from_samples(samples, spec.sample_rate, spec.channels))
}

/// Decode any probeable container with Symphonia
fn decode_with_symphonia(path: &Path, config: &EnfConfig) -> Result<AudioData, ExtractError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ExtractError::InputMissing(format!("{}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| ExtractError::Decode(format!("probe {}: {}", path.display(), e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractError::Decode(format!("no audio track in {}", path.display())))?;

    let track_id = track.id;
    let codec_params = &track.codec_params;

    let sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1) as u16;
    let cap = sample_cap(config, sample_rate, channels);

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractError::Decode(format!("decoder init: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        if samples.len() >= cap {
            log::warn!(
                "{}: decode capped at {} samples, clip exceeds the duration window",
                path.display(),
                cap
            );
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(ExtractError::Decode(format!("packet read: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        // Corrupted packets are skipped; a stream that is nothing but
        // corruption ends up empty and fails below.
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };

        append_interleaved(&decoded, &mut samples)?;
    }

    if samples.is_empty() {
        return Err(ExtractError::Decode(format!(
            "no decodable audio in {}",
            path.display()
        )));
    }

    Ok(AudioData::from_samples(samples, sample_rate, channels))
}

fn append_interleaved(decoded: &AudioBufferRef<'_>, out: &mut Vec<f32>) -> Result<(), ExtractError> {
    match decoded {
        AudioBufferRef::F32(buf) => {
            for frame_idx in 0..buf.frames() {
                for ch in 0..buf.spec().channels.count() {
                    out.push(buf.chan(ch)[frame_idx]);
                }
            }
        }
        AudioBufferRef::F64(buf) => {
            for frame_idx in 0..buf.frames() {
                for ch in 0..buf.spec().channels.count() {
                    out.push(buf.chan(ch)[frame_idx] as f32);
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            for frame_idx in 0..buf.frames() {
                for ch in 0..buf.spec().channels.count() {
                    out.push(buf.chan(ch)[frame_idx] as f32 / i32::MAX as f32);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for frame_idx in 0..buf.frames() {
                for ch in 0..buf.spec().channels.count() {
                    out.push(buf.chan(ch)[frame_idx] as f32 / i16::MAX as f32);
                }
            }
        }
        AudioBufferRef::U8(buf) => {
            for frame_idx in 0..buf.frames() {
                for ch in 0..buf.spec().channels.count() {
                    out.push((buf.chan(ch)[frame_idx] as f32 - 128.0) / 128.0);
                }
            }
        }
        _ => {
            return Err(ExtractError::Decode(
                "unsupported sample buffer layout".to_string(),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = AudioData {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0],
            sample_rate: 4,
            channels: 2,
            duration_ms: 750,
        };
        let mono = stereo.to_mono();
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_missing_file_is_input_missing() {
        let config = EnfConfig::default();
        let err = decode_audio("/nonexistent/clip.wav", &config).unwrap_err();
        assert!(matches!(err, ExtractError::InputMissing(_)));
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1000 {
            let v = (i as f32 / 1000.0 * std::f32::consts::TAU * 50.0).sin();
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let config = EnfConfig::default();
        let audio = decode_audio(path.to_str().unwrap(), &config).unwrap();
        assert_eq!(audio.sample_rate, 1000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), 1000);
        assert_eq!(audio.duration_ms, 1000);
    }

    #[test]
    fn test_wav_decode_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // 60 seconds at 100 Hz, well past the 35 s window.
        for _ in 0..6000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let config = EnfConfig::default();
        let audio = decode_audio(path.to_str().unwrap(), &config).unwrap();
        let cap = ((config.max_seconds + 1.0) * 100.0) as usize;
        assert_eq!(audio.samples.len(), cap);
    }
}
