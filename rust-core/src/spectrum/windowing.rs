//! Windowing functions for spectral analysis
//!
//! Applies windows to time-domain signals before FFT to reduce spectral leakage

use std::f64::consts::PI;

/// Generate Hann (Hanning) window coefficients
///
/// w[n] = 0.5 * (1 - cos(2πn/(M-1))) for n = 0..M-1
///
/// A single-point window is 1.0.
pub fn hann_window(length: usize) -> Vec<f64> {
    if length == 1 {
        return vec![1.0];
    }

    let m = length as f64;
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / (m - 1.0)).cos()))
        .collect()
}
