//! Configuration parameters for ENF extraction
//!
//! Defaults follow the 50 Hz European mains grid; a 60 Hz grid needs only
//! `nominal_hz` changed.

use serde::{Deserialize, Serialize};

/// ENF algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnfConfig {
    // Input gate
    pub min_seconds: f64,
    pub max_seconds: f64,

    // Band isolation
    pub nominal_hz: f64,
    pub highpass_hz: f64,
    pub bandpass_half_width_hz: f64,

    // Instantaneous-frequency post-processing
    pub analysis_sample_rate: u32,
    pub median_window_ms: u32,
    pub output_rate_hz: u32,

    // Outlier masking
    pub mask_tolerance_hz: f64,
    pub min_masked_fraction: f64,
    pub min_masked_samples: usize,
    pub low_confidence_quality_cap: f64,

    // Quality scoring (Welch PSD band ratio)
    pub quality_band_hz: f64,
    pub quality_neighborhood_hz: f64,
    pub quality_scale: f64,
    pub welch_segment_len: usize,
}

impl Default for EnfConfig {
    fn default() -> Self {
        Self {
            min_seconds: 30.0,
            max_seconds: 35.0,

            nominal_hz: 50.0,
            highpass_hz: 20.0,
            bandpass_half_width_hz: 2.0,

            analysis_sample_rate: 1000,
            median_window_ms: 200,
            output_rate_hz: 10,

            mask_tolerance_hz: 2.0,
            min_masked_fraction: 0.3,
            min_masked_samples: 5,
            low_confidence_quality_cap: 25.0,

            quality_band_hz: 1.0,
            quality_neighborhood_hz: 10.0,
            quality_scale: 0.5,
            welch_segment_len: 4096,
        }
    }
}

impl EnfConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.analysis_sample_rate == 0 {
            anyhow::bail!("analysis_sample_rate must be > 0");
        }
        if self.output_rate_hz == 0 || self.output_rate_hz > self.analysis_sample_rate {
            anyhow::bail!("output_rate_hz must be in 1..=analysis_sample_rate");
        }
        if self.min_seconds <= 0.0 || self.min_seconds >= self.max_seconds {
            anyhow::bail!("min_seconds must be positive and < max_seconds");
        }
        if self.nominal_hz <= 0.0 {
            anyhow::bail!("nominal_hz must be > 0");
        }
        // The band edges must sit below Nyquist at the analysis rate.
        let nyquist = self.analysis_sample_rate as f64 / 2.0;
        if self.nominal_hz + self.bandpass_half_width_hz >= nyquist {
            anyhow::bail!("bandpass upper edge must be below Nyquist");
        }
        if !(0.0..=1.0).contains(&self.min_masked_fraction) {
            anyhow::bail!("min_masked_fraction must be in [0, 1]");
        }
        if self.quality_band_hz <= 0.0 || self.quality_band_hz >= self.quality_neighborhood_hz {
            anyhow::bail!("quality_band_hz must be positive and < quality_neighborhood_hz");
        }
        if self.quality_scale <= 0.0 {
            anyhow::bail!("quality_scale must be > 0");
        }
        if self.welch_segment_len < 64 {
            anyhow::bail!("welch_segment_len must be >= 64");
        }
        Ok(())
    }

    /// Median-filter kernel length in samples, forced odd.
    pub fn median_kernel_len(&self) -> usize {
        let win = (self.analysis_sample_rate as u64 * self.median_window_ms as u64 / 1000) as usize;
        let win = win.max(5);
        if win % 2 == 0 {
            win + 1
        } else {
            win
        }
    }
}
