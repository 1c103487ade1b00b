//! PCM sample decoding
//!
//! Turns raw 8/16-bit PCM bytes into normalized floats in [-1, 1], either
//! downmixed to mono (for analysis) or interleaved (for the output device).

use super::format::{AudioFormat, RawFrame};
use crate::error::{Result, ScopeError};

/// Stateless PCM decoder
pub struct SampleDecoder;

impl SampleDecoder {
    /// Decode a frame to mono samples, averaging all channels
    pub fn decode(frame: &RawFrame) -> Result<Vec<f64>> {
        let mut samples = Vec::with_capacity(frame.frame_count());
        Self::decode_with(frame.format(), frame.bytes(), |s| samples.push(s))?;
        Ok(samples)
    }

    /// Decode to mono, handing each sample to `sink` in stream order.
    ///
    /// A trailing partial frame is ignored. Returns the number of samples
    /// produced. The width is validated before `sink` is called.
    pub fn decode_with<F>(format: &AudioFormat, bytes: &[u8], mut sink: F) -> Result<usize>
    where
        F: FnMut(f64),
    {
        Self::check_width(format)?;
        if format.channels == 0 {
            return Ok(0);
        }

        let width = format.bytes_per_sample();
        let channels = format.channels as usize;
        let mut produced = 0;

        for frame in bytes.chunks_exact(format.frame_size()) {
            let sum: f64 = frame
                .chunks_exact(width)
                .map(|sample| Self::read_sample(sample, format))
                .sum();
            sink(sum / channels as f64);
            produced += 1;
        }

        Ok(produced)
    }

    /// Decode keeping every channel, for feeding a float output stream.
    ///
    /// `out` is cleared first so callers can reuse one allocation.
    pub fn decode_interleaved(format: &AudioFormat, bytes: &[u8], out: &mut Vec<f32>) -> Result<()> {
        Self::check_width(format)?;
        out.clear();
        if format.channels == 0 {
            return Ok(());
        }

        let whole = bytes.len() - bytes.len() % format.frame_size();
        out.extend(
            bytes[..whole]
                .chunks_exact(format.bytes_per_sample())
                .map(|sample| Self::read_sample(sample, format) as f32),
        );
        Ok(())
    }

    /// Encode float samples as signed 16-bit PCM into `out`.
    ///
    /// Values outside [-1, 1] are clamped. Returns the bytes written.
    pub fn encode_pcm16(samples: &[f32], big_endian: bool, out: &mut [u8]) -> usize {
        let mut written = 0;
        for (sample, dst) in samples.iter().zip(out.chunks_exact_mut(2)) {
            let value = (sample.clamp(-1.0, 1.0) * 32768.0).clamp(-32768.0, 32767.0) as i16;
            let bytes = if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            dst.copy_from_slice(&bytes);
            written += 2;
        }
        written
    }

    fn check_width(format: &AudioFormat) -> Result<()> {
        match format.bits_per_sample {
            8 | 16 => Ok(()),
            bits => Err(ScopeError::UnsupportedSampleWidth { bits }),
        }
    }

    /// One channel sample, normalized
    #[inline]
    fn read_sample(bytes: &[u8], format: &AudioFormat) -> f64 {
        match (bytes.len(), format.signed) {
            (1, true) => bytes[0] as i8 as f64 / 128.0,
            (1, false) => (bytes[0] as i16 - 128) as f64 / 128.0,
            (_, signed) => {
                let pair = [bytes[0], bytes[1]];
                let raw = if format.big_endian {
                    u16::from_be_bytes(pair)
                } else {
                    u16::from_le_bytes(pair)
                };
                if signed {
                    raw as i16 as f64 / 32768.0
                } else {
                    (raw as i32 - 32768) as f64 / 32768.0
                }
            }
        }
    }
}
