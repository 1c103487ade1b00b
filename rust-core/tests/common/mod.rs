//! In-memory audio backend and WAV fixtures shared by the engine tests
#![allow(dead_code)]

use pcm_scope::audio::{AudioBackend, AudioFormat, CancelToken, InputDevice, OutputDevice};
use pcm_scope::{Result, ScopeError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Knobs and recordings shared between a test and the devices it opens
#[derive(Default)]
pub struct MockState {
    /// Every byte accepted by any output device, in write order
    pub written: Mutex<Vec<u8>>,
    pub writes: AtomicUsize,
    pub reads: AtomicUsize,
    /// Devices currently held open
    pub open_devices: AtomicUsize,
    pub opened_total: AtomicUsize,
    /// Fail the write/read with this 1-based index
    pub fail_after: Mutex<Option<usize>>,
    /// Refuse to open devices
    pub refuse_open: Mutex<Option<ScopeError>>,
    /// Format reported by input devices, defaults to the requested one
    pub input_format: Mutex<Option<AudioFormat>>,
    /// Per read/write delay. Writes ignore cancellation, like a stuck driver.
    pub io_delay: Mutex<Duration>,
    /// How long opening a device blocks
    pub open_delay: Mutex<Duration>,
}

impl MockState {
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn open_devices(&self) -> usize {
        self.open_devices.load(Ordering::SeqCst)
    }

    fn delay(&self) -> Duration {
        *self.io_delay.lock().unwrap()
    }

    fn should_fail(&self, count: usize) -> bool {
        self.fail_after.lock().unwrap().is_some_and(|n| count >= n)
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let backend = Self::default();
        *backend.state.io_delay.lock().unwrap() = delay;
        backend
    }

    pub fn shared(&self) -> Arc<dyn AudioBackend> {
        Arc::new(self.clone())
    }

    fn check_open(&self) -> Result<()> {
        thread::sleep(*self.state.open_delay.lock().unwrap());
        if let Some(err) = self.state.refuse_open.lock().unwrap().clone() {
            return Err(err);
        }
        self.state.open_devices.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioBackend for MockBackend {
    fn open_output(&self, _format: &AudioFormat) -> Result<Box<dyn OutputDevice>> {
        self.check_open()?;
        Ok(Box::new(MockOutput {
            state: Arc::clone(&self.state),
        }))
    }

    fn open_input(&self, format: &AudioFormat) -> Result<Box<dyn InputDevice>> {
        self.check_open()?;
        let format = self.state.input_format.lock().unwrap().unwrap_or(*format);
        Ok(Box::new(MockInput {
            state: Arc::clone(&self.state),
            format,
            counter: 0,
        }))
    }
}

struct MockOutput {
    state: Arc<MockState>,
}

impl OutputDevice for MockOutput {
    fn name(&self) -> &str {
        "mock output"
    }

    fn write(&mut self, data: &[u8], _cancel: &CancelToken) -> Result<()> {
        let count = self.state.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.should_fail(count) {
            return Err(ScopeError::DeviceFailure {
                device: "mock output".to_string(),
                reason: "simulated write failure".to_string(),
            });
        }
        thread::sleep(self.state.delay());
        self.state.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn drain(&mut self, _cancel: &CancelToken) -> Result<()> {
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.state.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Produces an incrementing byte counter
struct MockInput {
    state: Arc<MockState>,
    format: AudioFormat,
    counter: u8,
}

impl InputDevice for MockInput {
    fn name(&self) -> &str {
        "mock input"
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = self.state.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.should_fail(count) {
            return Err(ScopeError::DeviceFailure {
                device: "mock input".to_string(),
                reason: "simulated read failure".to_string(),
            });
        }
        thread::sleep(self.state.delay());
        for byte in buf.iter_mut() {
            *byte = self.counter;
            self.counter = self.counter.wrapping_add(1);
        }
        Ok(buf.len())
    }
}

impl Drop for MockInput {
    fn drop(&mut self) {
        self.state.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Route engine logs through the test harness, once per binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Write a 16-bit WAV and return its path plus the raw PCM bytes it holds
pub fn write_wav(dir: &Path, name: &str, channels: u16, frames: usize) -> (PathBuf, Vec<u8>) {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let mut pcm = Vec::with_capacity(frames * channels as usize * 2);
    for i in 0..frames * channels as usize {
        // Distinct values so duplicated or skipped chunks show up
        let sample = (i % 65536) as u16 as i16;
        writer.write_sample(sample).unwrap();
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    writer.finalize().unwrap();

    (path, pcm)
}
