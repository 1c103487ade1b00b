//! Configuration for the analyzer and the two producer engines

use crate::audio::format::AudioFormat;
use std::time::Duration;

/// Default values shared by the config structs
pub mod defaults {
    /// FFT window length used by the analyzer
    pub const FFT_SIZE: usize = 8192;

    /// Bytes read per worker iteration. Bounds pause/stop latency to one chunk.
    pub const CHUNK_SIZE: usize = 512;

    /// Upper bound on waiting for a worker thread to exit
    pub const JOIN_TIMEOUT_MS: u64 = 1000;

    /// Capture format: 44.1 kHz, 16-bit signed, stereo, little-endian
    pub const CAPTURE_SAMPLE_RATE: u32 = 44100;
    pub const CAPTURE_BITS_PER_SAMPLE: u16 = 16;
    pub const CAPTURE_CHANNELS: u16 = 2;

    /// How long an input read waits for samples before returning empty
    pub const DEVICE_POLL_MS: u64 = 20;

    /// Output write gives up when the device consumes nothing for this long.
    /// Kept below `JOIN_TIMEOUT_MS`.
    pub const WRITE_STALL_TIMEOUT_MS: u64 = 500;

    /// Upper bound on waiting for a worker to open its device
    pub const DEVICE_OPEN_TIMEOUT_MS: u64 = 5000;

    /// Device ring capacity, in seconds of audio
    pub const DEVICE_RING_SECONDS: f64 = 0.5;
}

/// Spectrum analyzer configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// FFT size and circular buffer length (must be a power of two)
    pub fft_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: defaults::FFT_SIZE,
        }
    }
}

/// File playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Bytes per worker iteration (rounded down to whole audio frames)
    pub chunk_size: usize,

    /// Bounded wait when joining the playback worker
    pub join_timeout: Duration,

    /// Bounded wait for the worker to open the output device
    pub open_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            join_timeout: Duration::from_millis(defaults::JOIN_TIMEOUT_MS),
            open_timeout: Duration::from_millis(defaults::DEVICE_OPEN_TIMEOUT_MS),
        }
    }
}

/// Live capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Fixed capture format negotiated with the input device
    pub format: AudioFormat,

    /// Bytes per worker iteration
    pub chunk_size: usize,

    /// Bounded wait when joining the capture worker
    pub join_timeout: Duration,

    /// Bounded wait for the worker to open the input device
    pub open_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::new(
                defaults::CAPTURE_SAMPLE_RATE,
                defaults::CAPTURE_BITS_PER_SAMPLE,
                defaults::CAPTURE_CHANNELS,
                false,
            ),
            chunk_size: defaults::CHUNK_SIZE,
            join_timeout: Duration::from_millis(defaults::JOIN_TIMEOUT_MS),
            open_timeout: Duration::from_millis(defaults::DEVICE_OPEN_TIMEOUT_MS),
        }
    }
}

/// Round a chunk size down to whole audio frames, never below one frame
pub(crate) fn frame_aligned_chunk(chunk_size: usize, format: &AudioFormat) -> usize {
    let frame = format.frame_size().max(1);
    (chunk_size / frame).max(1) * frame
}
