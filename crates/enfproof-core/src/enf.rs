//! ENF trace extraction
//!
//! Isolates the mains component around the nominal grid frequency, tracks
//! its instantaneous frequency through the analytic signal, and reduces the
//! track to a 10 Hz series with a quality score and a stable content hash.

use sha2::{Digest, Sha256};

use crate::config::EnfConfig;
use crate::dsp;
use crate::error::ExtractError;

/// Decimal places the frequency series is rounded to before hashing. Part
/// of the proof identity: changing it changes every clip's ENF hash.
pub const ENF_HASH_DECIMALS: i32 = 4;

/// Denoised instantaneous-frequency series around the nominal mains
/// frequency, produced once per clip and summarized into a proof.
#[derive(Debug, Clone)]
pub struct EnfSeries {
    /// Seconds from clip start, post-mask, at the fixed output rate.
    pub timestamps: Vec<f64>,
    /// Tracked frequency in Hz, same length as `timestamps`.
    pub frequencies: Vec<f64>,
    /// Signal-quality score in [0, 100].
    pub quality: f64,
    pub freq_mean: f64,
    pub freq_std: f64,
    /// SHA-256 over the rounded post-mask frequency values, lowercase hex.
    pub content_hash: String,
    /// True when the outlier mask collapsed and the score was capped.
    pub low_confidence: bool,
    pub output_rate_hz: u32,
}

/// Extract the ENF series from mono PCM.
///
/// Deterministic: identical samples, sample rate and config always produce
/// the identical series, score and hash.
pub fn extract_enf(
    samples: &[f32],
    sample_rate: u32,
    config: &EnfConfig,
) -> Result<EnfSeries, ExtractError> {
    let fs = sample_rate as f64;
    let seconds = samples.len() as f64 / fs;

    // Duration gate, boundary-inclusive on both ends: exactly min_seconds
    // is accepted, exactly max_seconds is accepted.
    if seconds < config.min_seconds {
        return Err(ExtractError::ClipTooShort {
            seconds,
            min_seconds: config.min_seconds,
        });
    }
    if seconds > config.max_seconds {
        return Err(ExtractError::ClipTooLong {
            seconds,
            max_seconds: config.max_seconds,
        });
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(ExtractError::Decode("non-finite PCM sample".to_string()));
    }

    // Normalize to unit peak.
    let peak = samples.iter().fold(0.0f32, |m, &v| m.max(v.abs())) as f64 + 1e-12;
    let x: Vec<f64> = samples.iter().map(|&v| v as f64 / peak).collect();

    // Remove DC and sub-audio rumble, then isolate the mains band.
    let x_hp = dsp::zero_phase_filter(&dsp::highpass_sections(config.highpass_hz, fs), &x);
    let x_bp = dsp::zero_phase_filter(
        &dsp::bandpass_sections(config.nominal_hz, config.bandpass_half_width_hz, fs),
        &x_hp,
    );

    // Quality: how much of the neighborhood's power sits in the narrow
    // band around the nominal frequency. Scored on the pre-band-pass
    // signal so the band-pass itself cannot flatter the ratio.
    let (freqs, psd) = dsp::welch_psd(&x_hp, fs, config.welch_segment_len);
    let band = dsp::band_power(
        &freqs,
        &psd,
        config.nominal_hz - config.quality_band_hz,
        config.nominal_hz + config.quality_band_hz,
    );
    let neighborhood = dsp::band_power(
        &freqs,
        &psd,
        config.nominal_hz - config.quality_neighborhood_hz,
        config.nominal_hz + config.quality_neighborhood_hz,
    );
    let ratio = band / (neighborhood + 1e-24);
    let mut quality = (100.0 * ratio / config.quality_scale).clamp(0.0, 100.0);

    // Instantaneous frequency, smoothed against impulsive jitter.
    let inst_f = dsp::instantaneous_frequency(&x_bp, fs);
    let smoothed = dsp::median_filter(&inst_f, config.median_kernel_len());

    // Decimate to the output rate.
    let step = (sample_rate / config.output_rate_hz).max(1) as usize;
    let series: Vec<f64> = smoothed.iter().step_by(step).copied().collect();

    // Mask samples too far from nominal to be real mains tracking.
    let mask: Vec<bool> = series
        .iter()
        .map(|&f| (f - config.nominal_hz).abs() <= config.mask_tolerance_hz)
        .collect();
    let surviving = mask.iter().filter(|&&m| m).count();
    let required = config
        .min_masked_samples
        .max((config.min_masked_fraction * series.len() as f64) as usize);

    let low_confidence = surviving < required;
    let (timestamps, frequencies): (Vec<f64>, Vec<f64>) = if low_confidence {
        // ENF not reliably detectable: keep the whole series, cap the score.
        quality = quality.min(config.low_confidence_quality_cap);
        series
            .iter()
            .enumerate()
            .map(|(i, &f)| (i as f64 / config.output_rate_hz as f64, f))
            .unzip()
    } else {
        series
            .iter()
            .enumerate()
            .filter(|(i, _)| mask[*i])
            .map(|(i, &f)| (i as f64 / config.output_rate_hz as f64, f))
            .unzip()
    };

    let (freq_mean, freq_std) = mean_std(&frequencies);
    let content_hash = hash_series(&frequencies);

    Ok(EnfSeries {
        timestamps,
        frequencies,
        quality,
        freq_mean,
        freq_std,
        content_hash,
        low_confidence,
        output_rate_hz: config.output_rate_hz,
    })
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Content hash of the series: values rounded to `ENF_HASH_DECIMALS`
/// places, serialized as little-endian f64 bytes, SHA-256, lowercase hex.
fn hash_series(frequencies: &[f64]) -> String {
    let scale = 10f64.powi(ENF_HASH_DECIMALS);
    let mut hasher = Sha256::new();
    for &f in frequencies {
        let rounded = (f * scale).round() / scale;
        hasher.update(rounded.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Deterministic uniform noise in [-1, 1]; tests must not pull in a
    /// seeded RNG dependency for this.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as f64 / (1u64 << 30) as f64 - 1.0
        }
    }

    fn sine_plus_noise(seconds: f64, fs: u32, tone_hz: f64, noise_amp: f64) -> Vec<f32> {
        let mut rng = Lcg(0x5eed);
        let n = (seconds * fs as f64) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs as f64;
                let tone = (std::f64::consts::TAU * tone_hz * t).sin();
                (tone + noise_amp * rng.next()) as f32
            })
            .collect()
    }

    fn noise_only(seconds: f64, fs: u32) -> Vec<f32> {
        let mut rng = Lcg(0xcafe);
        let n = (seconds * fs as f64) as usize;
        (0..n).map(|_| rng.next() as f32).collect()
    }

    #[test]
    fn test_determinism() {
        let config = EnfConfig::default();
        let samples = sine_plus_noise(32.0, 1000, 50.0, 0.3);

        let a = extract_enf(&samples, 1000, &config).unwrap();
        let b = extract_enf(&samples, 1000, &config).unwrap();

        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.quality, b.quality);
        assert_eq!(a.freq_mean, b.freq_mean);
        assert_eq!(a.freq_std, b.freq_std);
        assert_eq!(a.frequencies, b.frequencies);
    }

    #[test]
    fn test_duration_gate_boundaries() {
        let config = EnfConfig::default();

        // 29.9 s rejected.
        let short = sine_plus_noise(29.9, 1000, 50.0, 0.1);
        assert!(matches!(
            extract_enf(&short, 1000, &config),
            Err(ExtractError::ClipTooShort { .. })
        ));

        // Exactly 30.0 s accepted (boundary inclusive).
        let at_min = sine_plus_noise(30.0, 1000, 50.0, 0.1);
        assert!(extract_enf(&at_min, 1000, &config).is_ok());

        // Above the window rejected.
        let long = sine_plus_noise(35.5, 1000, 50.0, 0.1);
        assert!(matches!(
            extract_enf(&long, 1000, &config),
            Err(ExtractError::ClipTooLong { .. })
        ));
    }

    #[test]
    fn test_clean_mains_tone_scores_high_and_tracks() {
        let config = EnfConfig::default();
        let samples = sine_plus_noise(34.0, 1000, 50.0, 0.3);

        let series = extract_enf(&samples, 1000, &config).unwrap();
        assert!(series.quality > 60.0, "quality {}", series.quality);
        assert_abs_diff_eq!(series.freq_mean, 50.0, epsilon = 0.05);
        assert!(!series.low_confidence);
        assert!(!series.frequencies.is_empty());
    }

    #[test]
    fn test_white_noise_scores_low() {
        let config = EnfConfig::default();
        let samples = noise_only(34.0, 1000);

        let series = extract_enf(&samples, 1000, &config).unwrap();
        assert!(series.quality <= 30.0, "quality {}", series.quality);
    }

    #[test]
    fn test_hash_sensitive_to_single_sample() {
        let config = EnfConfig::default();
        let samples = sine_plus_noise(32.0, 1000, 50.0, 0.3);
        let baseline = extract_enf(&samples, 1000, &config).unwrap();

        // Recompute the hash with one retained value nudged past the
        // rounding precision.
        let mut nudged = baseline.frequencies.clone();
        let mid = nudged.len() / 2;
        nudged[mid] += 0.001;
        assert_ne!(hash_series(&nudged), baseline.content_hash);
    }

    #[test]
    fn test_hash_insensitive_below_rounding_precision() {
        let values = vec![50.00001, 49.99999];
        let nudged = vec![50.000011, 49.999989];
        assert_eq!(hash_series(&values), hash_series(&nudged));
    }

    #[test]
    fn test_off_nominal_tone_is_masked_out() {
        // A 58 Hz tone leaks through the band-pass skirts but its tracked
        // frequency sits far outside nominal ± 2 Hz, so the mask collapses
        // and the score is capped.
        let config = EnfConfig::default();
        let samples = sine_plus_noise(32.0, 1000, 58.0, 0.05);

        let series = extract_enf(&samples, 1000, &config).unwrap();
        assert!(series.low_confidence);
        assert!(series.quality <= config.low_confidence_quality_cap);
    }

    #[test]
    fn test_non_finite_input_is_decode_error() {
        let config = EnfConfig::default();
        let mut samples = sine_plus_noise(31.0, 1000, 50.0, 0.1);
        samples[100] = f32::NAN;
        assert!(matches!(
            extract_enf(&samples, 1000, &config),
            Err(ExtractError::Decode(_))
        ));
    }

    #[test]
    fn test_series_output_rate() {
        let config = EnfConfig::default();
        let samples = sine_plus_noise(30.0, 1000, 50.0, 0.2);
        let series = extract_enf(&samples, 1000, &config).unwrap();

        // 30 s at 10 Hz: at most 300 points survive the mask.
        assert!(series.frequencies.len() <= 300);
        assert_eq!(series.timestamps.len(), series.frequencies.len());
        assert_eq!(series.output_rate_hz, 10);
    }
}
