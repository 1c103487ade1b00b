//! PCM Scope - Audio Acquisition and Spectral Analysis Core
//!
//! Streams linear PCM from a WAV file or a live input device on a dedicated
//! worker thread, fans raw frames out to listeners, and turns them into
//! time-synchronized waveform/spectrum snapshots.

pub mod audio;
pub mod config;
pub mod error;
pub mod spectrum;

pub use audio::{
    AudioBackend, AudioFormat, CaptureEngine, CaptureState, CpalBackend, FrameListener,
    PlaybackEngine, PlaybackState, RawFrame, SampleDecoder,
};
pub use config::{AnalyzerConfig, CaptureConfig, PlaybackConfig};
pub use error::{Result, ScopeError};
pub use spectrum::{AnalysisListener, AnalysisSnapshot, SpectralTransform, StreamAnalyzer};
