//! Instantaneous frequency via the analytic signal

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Instantaneous frequency estimate, one value per input sample.
///
/// Computes the analytic signal (FFT, zero the negative frequencies,
/// inverse FFT), unwraps its phase, differentiates, and scales by
/// `fs / 2π`. The first estimate is duplicated so the output length
/// matches the input length.
pub fn instantaneous_frequency(x: &[f64], sample_rate: f64) -> Vec<f64> {
    if x.len() < 2 {
        return vec![0.0; x.len()];
    }

    let analytic = analytic_signal(x);

    let mut phase: Vec<f64> = analytic.iter().map(|c| c.im.atan2(c.re)).collect();
    unwrap_phase(&mut phase);

    let scale = sample_rate / (2.0 * PI);
    let mut inst_f = Vec::with_capacity(x.len());
    inst_f.push(0.0); // placeholder, overwritten below
    for i in 1..phase.len() {
        inst_f.push((phase[i] - phase[i - 1]) * scale);
    }
    inst_f[0] = inst_f[1];

    inst_f
}

/// Analytic signal via the frequency-domain Hilbert construction.
fn analytic_signal(x: &[f64]) -> Vec<Complex<f64>> {
    let n = x.len();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft.process(&mut buf);

    // Keep DC (and Nyquist for even n) as-is, double the positive
    // frequencies, zero the negative ones.
    let half = n / 2;
    if n % 2 == 0 {
        for v in buf.iter_mut().take(half).skip(1) {
            *v *= 2.0;
        }
        for v in buf.iter_mut().skip(half + 1) {
            *v = Complex::new(0.0, 0.0);
        }
    } else {
        for v in buf.iter_mut().take(half + 1).skip(1) {
            *v *= 2.0;
        }
        for v in buf.iter_mut().skip(half + 1) {
            *v = Complex::new(0.0, 0.0);
        }
    }

    ifft.process(&mut buf);
    let norm = 1.0 / n as f64;
    for v in buf.iter_mut() {
        *v *= norm;
    }
    buf
}

/// In-place phase unwrapping: removes 2π jumps between samples.
fn unwrap_phase(phase: &mut [f64]) {
    let two_pi = 2.0 * PI;
    let mut offset = 0.0;
    for i in 1..phase.len() {
        let raw = phase[i];
        let prev = phase[i - 1];
        let mut delta = raw + offset - prev;
        while delta > PI {
            offset -= two_pi;
            delta -= two_pi;
        }
        while delta < -PI {
            offset += two_pi;
            delta += two_pi;
        }
        phase[i] = raw + offset;
    }
}
