//! Streaming spectrum analyzer
//!
//! Decodes incoming PCM frames into a circular sample history and derives a
//! waveform/spectrum snapshot after every frame. Buffer mutation and
//! snapshot read-out happen under one lock, so each snapshot's waveform and
//! spectrum describe the same buffer state.

use super::circular::CircularBuffer;
use super::fft::SpectralTransform;
use crate::audio::decoder::SampleDecoder;
use crate::audio::format::RawFrame;
use crate::audio::listener::FrameListener;
use crate::config::AnalyzerConfig;
use crate::error::{Result, ScopeError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// One consistent analysis result
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    /// N samples, oldest first
    pub waveform: Vec<f64>,
    /// N/2 log-compressed magnitudes
    pub spectrum: Vec<f64>,
}

impl AnalysisSnapshot {
    fn zeroed(size: usize) -> Self {
        Self {
            waveform: vec![0.0; size],
            spectrum: vec![0.0; size / 2],
        }
    }
}

/// Receives a copy of every snapshot the analyzer produces.
///
/// Runs on whichever thread called [`StreamAnalyzer::ingest`].
pub trait AnalysisListener: Send + Sync {
    fn on_analysis(&self, snapshot: AnalysisSnapshot);
}

impl<F> AnalysisListener for F
where
    F: Fn(AnalysisSnapshot) + Send + Sync,
{
    fn on_analysis(&self, snapshot: AnalysisSnapshot) {
        self(snapshot)
    }
}

struct AnalyzerState {
    buffer: CircularBuffer,
    transform: SpectralTransform,
    snapshot: AnalysisSnapshot,
}

/// Circular-buffer spectrum analyzer
pub struct StreamAnalyzer {
    state: Mutex<AnalyzerState>,
    listener: RwLock<Option<Arc<dyn AnalysisListener>>>,
    fft_size: usize,
}

impl StreamAnalyzer {
    /// Create an analyzer whose window and transform length is `fft_size`
    pub fn new(fft_size: usize) -> Result<Self> {
        let transform = SpectralTransform::new(fft_size)?;
        Self::with_transform(fft_size, transform)
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Self::new(config.fft_size)
    }

    /// Pair a buffer of `window_len` samples with an existing transform.
    ///
    /// Fails with `BufferSizeMismatch` unless both lengths agree.
    pub fn with_transform(window_len: usize, transform: SpectralTransform) -> Result<Self> {
        if window_len != transform.size() {
            return Err(ScopeError::BufferSizeMismatch {
                buffer: window_len,
                transform: transform.size(),
            });
        }

        tracing::debug!("Stream analyzer created with {} point window", window_len);

        Ok(Self {
            state: Mutex::new(AnalyzerState {
                buffer: CircularBuffer::new(window_len),
                transform,
                snapshot: AnalysisSnapshot::zeroed(window_len),
            }),
            listener: RwLock::new(None),
            fft_size: window_len,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Register the snapshot consumer, replacing any previous one
    pub fn set_analysis_listener(&self, listener: Option<Arc<dyn AnalysisListener>>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Decode `frame` into the history, recompute the snapshot and hand a
    /// copy to the listener.
    ///
    /// An unsupported sample width leaves the history untouched.
    pub fn ingest(&self, frame: &RawFrame) -> Result<AnalysisSnapshot> {
        let snapshot = {
            let mut guard = self.lock();
            let state = &mut *guard;

            SampleDecoder::decode_with(frame.format(), frame.bytes(), |s| state.buffer.push(s))?;

            state.buffer.linearize_into(&mut state.snapshot.waveform);
            state
                .transform
                .compute_magnitude_into(&state.snapshot.waveform, &mut state.snapshot.spectrum)?;
            state.snapshot.clone()
        };

        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.on_analysis(snapshot.clone());
        }

        Ok(snapshot)
    }

    /// Copy of the latest snapshot, all zeros before the first frame
    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.lock().snapshot.clone()
    }

    /// Forget all history
    pub fn reset(&self) {
        let mut state = self.lock();
        state.buffer.clear();
        state.snapshot = AnalysisSnapshot::zeroed(self.fft_size);
    }

    fn lock(&self) -> MutexGuard<'_, AnalyzerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameListener for StreamAnalyzer {
    fn on_frame(&self, frame: RawFrame) {
        if let Err(e) = self.ingest(&frame) {
            tracing::warn!("Dropped frame of {} bytes: {}", frame.valid_bytes(), e);
        }
    }
}
