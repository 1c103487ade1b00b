//! Lock-free sample ring between a worker thread and a device callback
//!
//! cpal streams are callback driven. The playback worker pushes into the
//! producer end and the output callback pops; the input callback pushes and
//! the capture worker pops.

use super::worker::CancelToken;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::time::{Duration, Instant};

/// Sleep between polls while waiting on the other end of the ring
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a blocking write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Complete,
    /// `cancel` was set before every sample was queued
    Cancelled,
}

/// Device sample ring
pub struct AudioRingBuffer {
    producer: HeapProducer<f32>,
    consumer: HeapConsumer<f32>,
    capacity: usize,
}

impl AudioRingBuffer {
    /// Create new ring buffer with given capacity
    ///
    /// # Arguments
    /// * `capacity` - Buffer capacity in samples (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            capacity,
        }
    }

    /// Split into producer and consumer ends
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        (
            AudioProducer {
                producer: self.producer,
                capacity: self.capacity,
            },
            AudioConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer end of the ring
pub struct AudioProducer {
    producer: HeapProducer<f32>,
    capacity: usize,
}

impl AudioProducer {
    /// Write as many samples as fit, returning the count written
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Write every sample, waiting for the consumer to make room.
    ///
    /// Returns early once `cancel` is set. Gives up when no progress is made
    /// for `stall_timeout` and returns the number of samples that did get
    /// written.
    pub fn write_all(
        &mut self,
        samples: &[f32],
        stall_timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<WriteOutcome, usize> {
        let mut written = 0;
        let mut last_progress = Instant::now();

        while written < samples.len() {
            if cancel.is_cancelled() {
                return Ok(WriteOutcome::Cancelled);
            }
            let n = self.producer.push_slice(&samples[written..]);
            if n > 0 {
                written += n;
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= stall_timeout {
                return Err(written);
            } else {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(WriteOutcome::Complete)
    }

    /// Wait until the consumer has taken everything, up to `timeout`.
    ///
    /// Returns true when the ring emptied in time. Cancellation ends the
    /// wait early with false.
    pub fn wait_drained(&self, timeout: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }

    /// Free slots
    pub fn free_len(&self) -> usize {
        self.producer.free_len()
    }

    /// Samples written but not yet consumed
    pub fn pending(&self) -> usize {
        self.capacity - self.producer.free_len()
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer end of the ring
pub struct AudioConsumer {
    consumer: HeapConsumer<f32>,
}

impl AudioConsumer {
    /// Read available samples, zero-filling the rest of `buffer`.
    ///
    /// Used by output callbacks, which must always fill the device buffer.
    pub fn read_or_silence(&mut self, buffer: &mut [f32]) -> usize {
        let read = self.consumer.pop_slice(buffer);
        buffer[read..].fill(0.0);
        read
    }

    /// Read samples, waiting up to `timeout` for at least one to arrive
    pub fn read_timeout(&mut self, buffer: &mut [f32], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let n = self.consumer.pop_slice(buffer);
            if n > 0 || buffer.is_empty() || Instant::now() >= deadline {
                return n;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Get number of available samples
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
