//! WAV file sources
//!
//! hound parses the RIFF header and validates the format; the PCM payload is
//! then read as raw bytes so chunks can be handed to the device and to
//! listeners untouched.

use super::format::AudioFormat;
use crate::error::{Result, ScopeError};
use hound::{SampleFormat, WavReader};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Metadata of a loaded file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub format: AudioFormat,
    /// Length of the PCM payload in bytes
    pub total_bytes: u64,
}

impl SourceInfo {
    /// Validate that `path` exists, is readable, and holds 8/16-bit integer PCM
    pub fn probe(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| open_error(path, e))?;
        if !metadata.is_file() {
            return Err(ScopeError::CorruptedFile {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let reader = open_wav(path)?;
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int {
            return Err(unsupported(path, "floating point samples are not linear PCM"));
        }
        if spec.bits_per_sample != 8 && spec.bits_per_sample != 16 {
            return Err(unsupported(
                path,
                format!("{}-bit samples", spec.bits_per_sample),
            ));
        }
        if spec.channels == 0 {
            return Err(ScopeError::CorruptedFile {
                path: path.to_path_buf(),
                reason: "header declares zero channels".to_string(),
            });
        }

        // WAV is little-endian; 8-bit WAV samples are unsigned
        let format = AudioFormat::new(spec.sample_rate, spec.bits_per_sample, spec.channels, false)
            .with_signed(spec.bits_per_sample > 8);
        let total_bytes = reader.len() as u64 * format.bytes_per_sample() as u64;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            total_bytes,
        })
    }

    /// Payload duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        let rate = self.format.bytes_per_second();
        if rate > 0.0 {
            self.total_bytes as f64 / rate
        } else {
            0.0
        }
    }
}

/// Sequential reader over the PCM payload of a WAV file
pub struct PcmReader {
    path: PathBuf,
    inner: BufReader<File>,
    remaining: u64,
}

impl PcmReader {
    /// Open the payload positioned `offset` bytes in
    pub fn open(info: &SourceInfo, offset: u64) -> Result<Self> {
        let mut inner = open_wav(&info.path)?.into_inner();
        let offset = offset.min(info.total_bytes);

        if offset > 0 {
            inner
                .seek_relative(offset as i64)
                .map_err(|e| read_error(&info.path, e))?;
        }

        Ok(Self {
            path: info.path.clone(),
            inner,
            remaining: info.total_bytes - offset,
        })
    }

    /// Fill `buf` as far as the payload allows. Returns 0 at end of stream.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let mut filled = 0;

        while filled < want {
            match self.inner.read(&mut buf[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_error(&self.path, e)),
            }
        }

        self.remaining -= filled as u64;
        Ok(filled)
    }

    /// Payload bytes not yet read
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

fn open_wav(path: &Path) -> Result<WavReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    WavReader::new(BufReader::new(file)).map_err(|e| wav_error(path, e))
}

fn open_error(path: &Path, err: std::io::Error) -> ScopeError {
    match err.kind() {
        ErrorKind::NotFound => ScopeError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => ScopeError::AccessDenied {
            resource: path.display().to_string(),
        },
        _ => ScopeError::CorruptedFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}

fn wav_error(path: &Path, err: hound::Error) -> ScopeError {
    match err {
        hound::Error::IoError(e) => ScopeError::CorruptedFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
        // Not a RIFF/WAVE container at all
        hound::Error::FormatError(reason) if reason.starts_with("no ") => unsupported(path, reason),
        hound::Error::FormatError(reason) => ScopeError::CorruptedFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        },
        hound::Error::UnfinishedSample => ScopeError::CorruptedFile {
            path: path.to_path_buf(),
            reason: "truncated sample".to_string(),
        },
        other => unsupported(path, other),
    }
}

fn unsupported(path: &Path, reason: impl ToString) -> ScopeError {
    ScopeError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_error(path: &Path, err: std::io::Error) -> ScopeError {
    ScopeError::StreamRead {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
