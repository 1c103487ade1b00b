//! Fixed-capacity sample history
//!
//! Always holds the `capacity` most recently written samples. The write
//! cursor points at the oldest one, so reading from the cursor forward and
//! wrapping once yields chronological order.

/// Overwriting circular buffer of normalized samples
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    samples: Vec<f64>,
    cursor: usize,
}

impl CircularBuffer {
    /// Zero-filled buffer of `capacity` samples (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Index the next write lands on
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Overwrite the oldest sample
    #[inline]
    pub fn push(&mut self, sample: f64) {
        self.samples[self.cursor] = sample;
        self.cursor += 1;
        if self.cursor == self.samples.len() {
            self.cursor = 0;
        }
    }

    pub fn extend_from_slice(&mut self, samples: &[f64]) {
        for &s in samples {
            self.push(s);
        }
    }

    /// Copy out oldest-first into `out`, which must match the capacity
    pub fn linearize_into(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.samples.len());
        let (newer, older) = self.samples.split_at(self.cursor);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
    }

    /// Oldest-first copy
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.samples.len()];
        self.linearize_into(&mut out);
        out
    }

    /// Zero all samples and rewind the cursor
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
        self.cursor = 0;
    }
}
