//! Audio fingerprint collaborator

use std::path::Path;

use anyhow::{Context, Result};
use rustfft::{num_complex::Complex, FftPlanner};

/// Produces an opaque, comparable fingerprint token for a staged WAV file.
pub trait AudioFingerprinter: Send + Sync {
    /// Tag stored next to the token so tokens from different algorithms
    /// are never compared against each other.
    fn algorithm(&self) -> &'static str;

    fn fingerprint(&self, wav_path: &Path) -> Result<String>;
}

const FRAME_SIZE: usize = 4096;
const HOP_SIZE: usize = 2048;
const NUM_BANDS: usize = 16;
const BAND_LO_HZ: f32 = 100.0;
const BAND_HI_HZ: f32 = 4000.0;

/// Band-energy transition fingerprint.
///
/// Each Hann-windowed frame is reduced to log-spaced band energies; every
/// band contributes one bit per frame, set when the band gained energy
/// since the previous frame. Four hex digits per frame, concatenated.
pub struct SpectralFingerprinter;

impl AudioFingerprinter for SpectralFingerprinter {
    fn algorithm(&self) -> &'static str {
        "specband1"
    }

    fn fingerprint(&self, wav_path: &Path) -> Result<String> {
        let mut reader = hound::WavReader::open(wav_path)
            .with_context(|| format!("open staged wav {}", wav_path.display()))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let mono: Vec<f32> = if spec.channels > 1 {
            samples
                .chunks(spec.channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        } else {
            samples
        };

        Ok(fingerprint_samples(&mono, spec.sample_rate))
    }
}

fn fingerprint_samples(samples: &[f32], sample_rate: u32) -> String {
    let window: Vec<f32> = (0..FRAME_SIZE)
        .map(|i| {
            let t = i as f32 / (FRAME_SIZE - 1) as f32;
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
        })
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);
    let mut buf = vec![Complex::new(0.0f32, 0.0); FRAME_SIZE];

    let mut token = String::new();
    let mut prev_bands: Option<[f32; NUM_BANDS]> = None;

    let mut start = 0;
    while start + FRAME_SIZE <= samples.len() {
        for (i, v) in buf.iter_mut().enumerate() {
            *v = Complex::new(samples[start + i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        let bands = band_energies(&buf, sample_rate);
        if let Some(prev) = prev_bands {
            let mut bits: u16 = 0;
            for (b, (&cur, &before)) in bands.iter().zip(prev.iter()).enumerate() {
                if cur > before {
                    bits |= 1 << b;
                }
            }
            token.push_str(&format!("{:04x}", bits));
        }
        prev_bands = Some(bands);
        start += HOP_SIZE;
    }

    token
}

/// Log-spaced band energies between `BAND_LO_HZ` and `BAND_HI_HZ`.
fn band_energies(spectrum: &[Complex<f32>], sample_rate: u32) -> [f32; NUM_BANDS] {
    let mut bands = [0.0f32; NUM_BANDS];
    let fft_size = spectrum.len();
    let log_lo = BAND_LO_HZ.ln();
    let log_hi = BAND_HI_HZ.ln();

    for (bin, value) in spectrum.iter().enumerate().take(fft_size / 2).skip(1) {
        let freq = bin as f32 * sample_rate as f32 / fft_size as f32;
        if !(BAND_LO_HZ..BAND_HI_HZ).contains(&freq) {
            continue;
        }
        let band = ((freq.ln() - log_lo) / (log_hi - log_lo) * NUM_BANDS as f32) as usize;
        bands[band.min(NUM_BANDS - 1)] += value.norm_sqr();
    }

    bands
}
