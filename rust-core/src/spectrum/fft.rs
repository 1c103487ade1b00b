//! Radix-2 Cooley–Tukey FFT engine
//!
//! The bit-reversal permutation, twiddle factors and Hann window are
//! computed once per transform size and reused for every call.

use super::windowing::hann_window;
use crate::error::{Result, ScopeError};
use num_complex::Complex;
use std::f64::consts::PI;

/// Precomputed tables for one transform length. Never mutated after
/// construction.
#[derive(Debug, Clone)]
pub struct TransformPlan {
    size: usize,
    bit_reverse: Vec<usize>,
    cos: Vec<f64>,
    sin: Vec<f64>,
    window: Vec<f64>,
}

impl TransformPlan {
    /// Build tables for `size`, which must be a power of two >= 2
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(ScopeError::InvalidTransformSize { size });
        }

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size).map(|i| reverse_bits(i, bits)).collect();

        let (cos, sin) = (0..size / 2)
            .map(|i| {
                let angle = -2.0 * PI * i as f64 / size as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();

        Ok(Self {
            size,
            bit_reverse,
            cos,
            sin,
            window: hann_window(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bit_reverse(&self) -> &[usize] {
        &self.bit_reverse
    }

    /// Twiddle factors e^(-2πi·k/N) for k in [0, N/2), as (cos, sin) tables
    pub fn twiddles(&self) -> (&[f64], &[f64]) {
        (&self.cos, &self.sin)
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }
}

/// Reverse the low `bits` bits of `x`
fn reverse_bits(x: usize, bits: u32) -> usize {
    x.reverse_bits() >> (usize::BITS - bits)
}

/// FFT engine producing log-compressed magnitude spectra
pub struct SpectralTransform {
    plan: TransformPlan,
    /// Fully overwritten on every call
    scratch: Vec<Complex<f64>>,
}

impl SpectralTransform {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `size` - FFT size (power of two, at least 2)
    pub fn new(size: usize) -> Result<Self> {
        let plan = TransformPlan::new(size)?;
        Ok(Self {
            scratch: vec![Complex::new(0.0, 0.0); size],
            plan,
        })
    }

    /// Get FFT size
    pub fn size(&self) -> usize {
        self.plan.size
    }

    /// Number of output bins (N/2)
    pub fn num_bins(&self) -> usize {
        self.plan.size / 2
    }

    pub fn plan(&self) -> &TransformPlan {
        &self.plan
    }

    /// Compute the magnitude spectrum
    ///
    /// # Arguments
    /// * `samples` - Exactly N time-domain samples
    ///
    /// # Returns
    /// log10(1 + |X[k]|) for k = 0..N/2 of the Hann-windowed input
    pub fn compute_magnitude(&mut self, samples: &[f64]) -> Result<Vec<f64>> {
        let mut spectrum = vec![0.0; self.num_bins()];
        self.compute_magnitude_into(samples, &mut spectrum)?;
        Ok(spectrum)
    }

    /// Like [`compute_magnitude`](Self::compute_magnitude) but writes into
    /// `spectrum`, which must hold N/2 values
    pub fn compute_magnitude_into(&mut self, samples: &[f64], spectrum: &mut [f64]) -> Result<()> {
        let n = self.plan.size;
        if samples.len() != n {
            return Err(ScopeError::SampleLengthMismatch {
                expected: n,
                actual: samples.len(),
            });
        }
        if spectrum.len() != n / 2 {
            return Err(ScopeError::SampleLengthMismatch {
                expected: n / 2,
                actual: spectrum.len(),
            });
        }

        // Window and bit-reversal permutation in one pass
        for (i, (&sample, &w)) in samples.iter().zip(&self.plan.window).enumerate() {
            self.scratch[self.plan.bit_reverse[i]] = Complex::new(sample * w, 0.0);
        }

        self.butterflies();

        for (out, bin) in spectrum.iter_mut().zip(&self.scratch) {
            *out = (1.0 + bin.norm_sqr().sqrt()).log10();
        }

        Ok(())
    }

    /// In-place iterative decimation-in-time stages
    fn butterflies(&mut self) {
        let n = self.plan.size;
        let data = &mut self.scratch;

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;

            for start in (0..n).step_by(len) {
                for j in 0..half {
                    let k = j * step;
                    let twiddle = Complex::new(self.plan.cos[k], self.plan.sin[k]);

                    let u = data[start + j];
                    let t = twiddle * data[start + j + half];
                    data[start + j] = u + t;
                    data[start + j + half] = u - t;
                }
            }

            len <<= 1;
        }
    }
}
