//! Spectral analysis: FFT engine, Hanning window, and the streaming analyzer

pub mod analysis;
pub mod circular;
pub mod fft;
pub mod windowing;

pub use analysis::{AnalysisListener, AnalysisSnapshot, StreamAnalyzer};
pub use circular::CircularBuffer;
pub use fft::{SpectralTransform, TransformPlan};
pub use windowing::hann_window;
