//! Audio output playback using cpal
//!
//! Raw PCM chunks are decoded to interleaved f32 and pushed into a ring
//! buffer that the output callback drains.

use super::buffer::{AudioProducer, AudioRingBuffer, WriteOutcome};
use super::decoder::SampleDecoder;
use super::device::{classify_backend, classify_build_error, unavailable, OutputDevice};
use super::format::AudioFormat;
use super::worker::CancelToken;
use crate::config::defaults;
use crate::error::{Result, ScopeError};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio output stream
pub struct CpalOutput {
    name: String,
    format: AudioFormat,
    producer: AudioProducer,
    scratch: Vec<f32>,
    failed: Arc<AtomicBool>,
    stall_timeout: Duration,
    // Dropping the stream releases the device
    _stream: Stream,
}

impl CpalOutput {
    /// Open an output stream on `device` matching the file's rate and channels.
    ///
    /// No resampling is done, so a device that cannot run at the stream's
    /// native rate is reported unavailable.
    pub fn open(device: Device, format: AudioFormat) -> Result<Self> {
        let name = device.name().map_err(|e| unavailable("output", e))?;

        let supported = device
            .supported_output_configs()
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
                    "no output configuration for {} Hz, {} channels",
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
        let (producer, mut consumer) = AudioRingBuffer::new(capacity).split();

        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);
        let device_name = name.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    consumer.read_or_silence(data);
                },
                move |err| {
                    tracing::error!("Audio output error on '{}': {}", device_name, err);
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

        tracing::debug!(
            "Opened output '{}' at {} Hz, {} channels",
            name,
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            name,
            format,
            producer,
            scratch: Vec::new(),
            failed,
            stall_timeout: Duration::from_millis(defaults::WRITE_STALL_TIMEOUT_MS),
            _stream: stream,
        })
    }

    fn check_stream(&self) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            Err(ScopeError::DeviceFailure {
                device: self.name.clone(),
                reason: "output stream reported an error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, data: &[u8], cancel: &CancelToken) -> Result<()> {
        self.check_stream()?;
        SampleDecoder::decode_interleaved(&self.format, data, &mut self.scratch)?;

        match self
            .producer
            .write_all(&self.scratch, self.stall_timeout, cancel)
        {
            Ok(WriteOutcome::Complete) => Ok(()),
            Ok(WriteOutcome::Cancelled) => {
                tracing::debug!("Output write on '{}' abandoned for shutdown", self.name);
                Ok(())
            }
            Err(written) => Err(ScopeError::DeviceFailure {
                device: self.name.clone(),
                reason: format!(
                    "output stalled after {} of {} samples",
                    written,
                    self.scratch.len()
                ),
            }),
        }
    }

    fn drain(&mut self, cancel: &CancelToken) -> Result<()> {
        self.check_stream()?;
        if !self.producer.wait_drained(self.stall_timeout, cancel) && !cancel.is_cancelled() {
            tracing::warn!(
                "Output '{}' still had {} samples queued at drain timeout",
                self.name,
                self.producer.pending()
            );
        }
        Ok(())
    }
}
