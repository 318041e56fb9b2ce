//! Welch power-spectral-density estimation

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// One-sided Welch PSD with a Hann window and 50 % segment overlap.
///
/// Returns `(frequencies_hz, psd)`, each of length `nperseg / 2 + 1`.
/// `nperseg` is clamped to the input length when the input is short.
pub fn welch_psd(x: &[f64], sample_rate: f64, nperseg: usize) -> (Vec<f64>, Vec<f64>) {
    let nperseg = nperseg.min(x.len()).max(8);
    let hop = nperseg / 2;

    let window: Vec<f64> = (0..nperseg)
        .map(|i| {
            let t = i as f64 / (nperseg - 1) as f64;
            0.5 * (1.0 - (2.0 * PI * t).cos())
        })
        .collect();
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nperseg);

    let n_bins = nperseg / 2 + 1;
    let mut psd = vec![0.0; n_bins];
    let mut num_segments = 0usize;
    let mut buf = vec![Complex::new(0.0, 0.0); nperseg];

    let mut start = 0;
    while start + nperseg <= x.len() {
        for (i, v) in buf.iter_mut().enumerate() {
            *v = Complex::new(x[start + i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        for (bin, acc) in psd.iter_mut().enumerate() {
            *acc += buf[bin].norm_sqr();
        }

        num_segments += 1;
        start += hop;
    }

    if num_segments == 0 {
        // Shorter than one segment: single zero-padded segment.
        for (i, v) in buf.iter_mut().enumerate() {
            *v = if i < x.len() {
                Complex::new(x[i] * window[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }
        fft.process(&mut buf);
        for (bin, acc) in psd.iter_mut().enumerate() {
            *acc += buf[bin].norm_sqr();
        }
        num_segments = 1;
    }

    let scale = 1.0 / (sample_rate * window_power * num_segments as f64);
    for (bin, v) in psd.iter_mut().enumerate() {
        *v *= scale;
        // One-sided: everything except DC and Nyquist appears twice in the
        // two-sided spectrum.
        if bin != 0 && !(nperseg % 2 == 0 && bin == n_bins - 1) {
            *v *= 2.0;
        }
    }

    let freqs = (0..n_bins)
        .map(|bin| bin as f64 * sample_rate / nperseg as f64)
        .collect();

    (freqs, psd)
}

/// Integrated power over `[lo_hz, hi_hz]`.
pub fn band_power(freqs: &[f64], psd: &[f64], lo_hz: f64, hi_hz: f64) -> f64 {
    let df = if freqs.len() > 1 { freqs[1] - freqs[0] } else { 1.0 };
    freqs
        .iter()
        .zip(psd)
        .filter(|(&f, _)| f >= lo_hz && f <= hi_hz)
        .map(|(_, &p)| p * df)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tone_power_concentrates_at_tone() {
        let fs = 1000.0;
        let n = 20000;
        let x: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 50.0 * i as f64 / fs).sin())
            .collect();

        let (freqs, psd) = welch_psd(&x, fs, 4096);
        let in_band = band_power(&freqs, &psd, 49.0, 51.0);
        let total = band_power(&freqs, &psd, 0.0, fs / 2.0);
        assert!(in_band / total > 0.95, "ratio {}", in_band / total);
    }

    #[test]
    fn test_tone_total_power() {
        // A unit sine carries power 1/2; Welch must integrate back to it.
        let fs = 1000.0;
        let n = 40000;
        let x: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 100.0 * i as f64 / fs).sin())
            .collect();

        let (freqs, psd) = welch_psd(&x, fs, 4096);
        let total = band_power(&freqs, &psd, 0.0, fs / 2.0);
        assert_relative_eq!(total, 0.5, max_relative = 0.05);
    }

    #[test]
    fn test_short_input_single_segment() {
        let x = vec![1.0; 100];
        let (freqs, psd) = welch_psd(&x, 1000.0, 4096);
        assert_eq!(freqs.len(), psd.len());
        assert!(!psd.is_empty());
    }

    #[test]
    fn test_band_power_bounds() {
        let freqs = vec![0.0, 1.0, 2.0, 3.0];
        let psd = vec![1.0, 1.0, 1.0, 1.0];
        assert_relative_eq!(band_power(&freqs, &psd, 1.0, 2.0), 2.0);
    }
}
