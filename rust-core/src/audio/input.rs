//! Audio input capture using cpal
//!
//! Real-time capture from microphone or line-in, re-encoded as 16-bit PCM
//! in the engine's fixed capture format.

use super::buffer::{AudioConsumer, AudioRingBuffer};
use super::decoder::SampleDecoder;
use super::device::{classify_backend, classify_build_error, unavailable, InputDevice};
use super::format::AudioFormat;
use crate::config::defaults;
use crate::error::{Result, ScopeError};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio input stream
pub struct CpalInput {
    name: String,
    format: AudioFormat,
    consumer: AudioConsumer,
    scratch: Vec<f32>,
    failed: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    poll: Duration,
    // Dropping the stream releases the device
    _stream: Stream,
}

impl CpalInput {
    /// Open a capture stream on `device` in exactly `format`
    pub fn open(device: Device, format: AudioFormat) -> Result<Self> {
        let name = device.name().map_err(|e| unavailable("input", e))?;

        if format.bits_per_sample != 16 {
            return Err(ScopeError::UnsupportedSampleWidth {
                bits: format.bits_per_sample,
            });
        }

        let supported = device
            .supported_input_configs()
            .map_err(|e| unavailable(&name, e))?
            .any(|range| {
                range.channels() == format.channels
                    && range.min_sample_rate().0 <= format.sample_rate
                    && range.max_sample_rate().0 >= format.sample_rate
            });
        if !supported {
            return Err(unavailable(
                &name,
                format!(
                    "does not support {} Hz, {} channels",
                    format.sample_rate, format.channels
                ),
            ));
        }

        let stream_config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (format.sample_rate as f64
            * format.channels as f64
            * defaults::DEVICE_RING_SECONDS) as usize;
        let (mut producer, consumer) = AudioRingBuffer::new(capacity).split();

        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);
        let overruns = Arc::new(AtomicU64::new(0));
        let overruns_cb = Arc::clone(&overruns);
        let device_name = name.clone();
        let channels = format.channels.max(1) as usize;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Whole frames only, so the reader never sees a split frame
                    let room = (producer.free_len() / channels) * channels;
                    let written = producer.write(&data[..data.len().min(room)]);
                    if written < data.len() {
                        overruns_cb.fetch_add((data.len() - written) as u64, Ordering::Relaxed);
                    }
                },
                move |err| {
                    tracing::error!("Audio input error on '{}': {}", device_name, err);
                    failed_cb.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| classify_build_error(&name, e))?;

        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::BackendSpecific { err } => classify_backend(&name, err.description),
            other => ScopeError::DeviceBusy {
                device: name.clone(),
                reason: other.to_string(),
            },
        })?;

        Ok(Self {
            name,
            format,
            consumer,
            scratch: Vec::new(),
            failed,
            overruns,
            poll: Duration::from_millis(defaults::DEVICE_POLL_MS),
            _stream: stream,
        })
    }
}

impl InputDevice for CpalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(ScopeError::DeviceFailure {
                device: self.name.clone(),
                reason: "input stream reported an error".to_string(),
            });
        }

        // Whole frames only
        let frame = self.format.frame_size().max(1);
        let samples = (buf.len() / frame) * self.format.channels as usize;
        self.scratch.resize(samples, 0.0);

        let read = self.consumer.read_timeout(&mut self.scratch, self.poll);
        Ok(SampleDecoder::encode_pcm16(
            &self.scratch[..read],
            self.format.big_endian,
            buf,
        ))
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        let dropped = self.overruns.load(Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!("Input '{}' dropped {} samples on overrun", self.name, dropped);
        }
    }
}
