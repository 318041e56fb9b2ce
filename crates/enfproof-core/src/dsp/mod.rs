//! Signal-processing primitives for ENF tracking
//!
//! Narrow-band isolation (biquad Butterworth sections run zero-phase),
//! analytic-signal instantaneous frequency, impulse-robust median
//! smoothing, and Welch spectral estimation for the quality score.

mod filter;
mod hilbert;
mod median;
mod welch;

pub use filter::{bandpass_sections, highpass_sections, zero_phase_filter, Biquad};
pub use hilbert::instantaneous_frequency;
pub use median::median_filter;
pub use welch::{band_power, welch_psd};
