//! Error types for the acquisition and analysis pipeline
//!
//! Every public failure mode is its own variant and carries enough context
//! (path, device, requested size) for the caller to build a message.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScopeError {
    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Access denied: {resource}")]
    AccessDenied { resource: String },

    #[error("Unsupported audio format in {}: {reason}", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Corrupted or unreadable file {}: {reason}", .path.display())]
    CorruptedFile { path: PathBuf, reason: String },

    #[error("Audio device '{device}' unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("Audio device '{device}' busy: {reason}")]
    DeviceBusy { device: String, reason: String },

    #[error("Audio device '{device}' failed: {reason}")]
    DeviceFailure { device: String, reason: String },

    #[error("FFT size must be a power of two >= 2 (got {size})")]
    InvalidTransformSize { size: usize },

    #[error("Sample block has {actual} samples, transform expects {expected}")]
    SampleLengthMismatch { expected: usize, actual: usize },

    #[error("Unsupported sample width: {bits} bits (only 8 and 16 are decoded)")]
    UnsupportedSampleWidth { bits: u16 },

    #[error("Analyzer window of {buffer} samples does not match transform size {transform}")]
    BufferSizeMismatch { buffer: usize, transform: usize },

    #[error("Failed to read PCM data from {}: {reason}", .path.display())]
    StreamRead { path: PathBuf, reason: String },

    #[error("No audio file loaded")]
    NoSourceLoaded,

    #[error("Failed to spawn worker thread '{name}': {reason}")]
    WorkerSpawn { name: String, reason: String },
}

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, ScopeError>;
