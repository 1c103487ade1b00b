//! Live capture engine
//!
//! Same listener contract as playback, sourced from an input device in a
//! fixed format and without the output write step.
//!
//! ```text
//! Idle --start--> Capturing --stop--> Idle
//! ```

use super::device::{AudioBackend, InputDevice};
use super::format::{AudioFormat, RawFrame};
use super::listener::{ErrorHook, ErrorSink, FrameListener, ListenerSet};
use super::worker::{CancelToken, Worker};
use crate::config::{frame_aligned_chunk, CaptureConfig};
use crate::error::{Result, ScopeError};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

struct Control {
    state: CaptureState,
    session: u64,
}

struct Shared {
    control: Mutex<Control>,
    listeners: ListenerSet,
    errors: ErrorSink,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, session: u64) -> bool {
        self.lock().session == session
    }

    fn finish(&self, session: u64) {
        let mut control = self.lock();
        if control.session == session {
            control.state = CaptureState::Idle;
        }
    }

    /// Retire `session` without waiting for its worker
    fn abandon(&self, session: u64) {
        let mut control = self.lock();
        if control.session == session {
            control.state = CaptureState::Idle;
            control.session += 1;
        }
    }
}

struct CaptureJob {
    shared: Arc<Shared>,
    backend: Arc<dyn AudioBackend>,
    format: AudioFormat,
    chunk_size: usize,
    session: u64,
}

impl CaptureJob {
    fn run(self, cancel: CancelToken, init_tx: Sender<Result<()>>) {
        let mut device = match self.open() {
            Ok(device) => {
                if cancel.is_cancelled() {
                    tracing::debug!("Input opened after start() gave up, releasing it");
                    return;
                }
                let _ = init_tx.send(Ok(()));
                device
            }
            Err(e) => {
                self.shared.finish(self.session);
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        let outcome = self.capture(device.as_mut(), &cancel);
        let device_name = device.name().to_string();
        drop(device);

        match outcome {
            Ok(()) => tracing::debug!("Capture loop ended"),
            Err(e) => {
                tracing::error!("Capture on '{}' failed: {}", device_name, e);
                if self.shared.is_current(self.session) {
                    self.shared.errors.report(e);
                }
            }
        }
        self.shared.finish(self.session);
    }

    fn open(&self) -> Result<Box<dyn InputDevice>> {
        let device = self.backend.open_input(&self.format)?;
        if device.format() != self.format {
            return Err(ScopeError::DeviceUnavailable {
                device: device.name().to_string(),
                reason: format!("negotiated {:?}, expected {:?}", device.format(), self.format),
            });
        }
        Ok(device)
    }

    fn capture(&self, device: &mut dyn InputDevice, cancel: &CancelToken) -> Result<()> {
        let mut buf = vec![0u8; self.chunk_size];

        while !cancel.is_cancelled() {
            let n = device.read(&mut buf)?;
            if n == 0 || cancel.is_cancelled() {
                continue;
            }
            self.shared
                .listeners
                .notify(&RawFrame::new(buf[..n].to_vec(), self.format));
        }

        Ok(())
    }
}

/// Streams PCM from an input device to frame listeners
pub struct CaptureEngine {
    config: CaptureConfig,
    backend: Arc<dyn AudioBackend>,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl CaptureEngine {
    pub fn new(backend: Arc<dyn AudioBackend>, config: CaptureConfig) -> Self {
        Self {
            config,
            backend,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: CaptureState::Idle,
                    session: 0,
                }),
                listeners: ListenerSet::new(),
                errors: ErrorSink::default(),
            }),
            worker: None,
        }
    }

    pub fn add_frame_listener(&self, listener: Arc<dyn FrameListener>) {
        self.shared.listeners.add(listener);
    }

    /// Observer for errors that terminate the worker
    pub fn set_error_hook(&self, hook: Option<ErrorHook>) {
        self.shared.errors.set_hook(hook);
    }

    pub fn take_last_error(&self) -> Option<ScopeError> {
        self.shared.errors.take_last()
    }

    /// Acquire the input device and start the capture worker.
    ///
    /// A no-op when already capturing.
    pub fn start(&mut self) -> Result<()> {
        self.reap_finished();

        let session = {
            let mut control = self.shared.lock();
            if control.state == CaptureState::Capturing && self.worker.is_some() {
                return Ok(());
            }
            control.state = CaptureState::Capturing;
            control.session += 1;
            control.session
        };

        // A worker that failed on its own but has not exited yet
        if let Some(previous) = self.worker.take() {
            previous.join_timeout(self.config.join_timeout);
        }

        let job = CaptureJob {
            shared: Arc::clone(&self.shared),
            backend: Arc::clone(&self.backend),
            format: self.config.format,
            chunk_size: frame_aligned_chunk(self.config.chunk_size, &self.config.format),
            session,
        };

        let (init_tx, init_rx) = bounded::<Result<()>>(1);
        let worker = Worker::spawn("audio-capture", move |cancel| job.run(cancel, init_tx))
            .map_err(|e| {
                self.shared.finish(session);
                e
            })?;

        match init_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                let format = self.config.format;
                tracing::info!(
                    "Capture started ({} Hz, {}-bit, {} channels)",
                    format.sample_rate,
                    format.bits_per_sample,
                    format.channels
                );
                Ok(())
            }
            Ok(Err(e)) => {
                worker.join_timeout(self.config.join_timeout);
                tracing::error!("Could not start capture: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                worker.cancel();
                self.shared.abandon(session);
                tracing::warn!(
                    "Input device did not open within {:?}, detaching worker",
                    self.config.open_timeout
                );
                Err(ScopeError::DeviceUnavailable {
                    device: "input".to_string(),
                    reason: format!("device did not open within {:?}", self.config.open_timeout),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.join_timeout(self.config.join_timeout);
                self.shared.finish(session);
                Err(ScopeError::DeviceUnavailable {
                    device: "input".to_string(),
                    reason: "capture worker exited during initialization".to_string(),
                })
            }
        }
    }

    /// Signal the worker, join it with a bounded wait, return to Idle
    pub fn stop(&mut self) {
        let worker = self.worker.take();
        if let Some(worker) = &worker {
            worker.cancel();
        }

        {
            let mut control = self.shared.lock();
            control.state = CaptureState::Idle;
            control.session += 1;
        }

        if let Some(worker) = worker {
            worker.join_timeout(self.config.join_timeout);
            tracing::info!("Capture stopped");
        }
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == CaptureState::Capturing
    }

    /// The fixed capture format
    pub fn format(&self) -> AudioFormat {
        self.config.format
    }

    fn reap_finished(&mut self) {
        if self.worker.as_ref().is_some_and(Worker::is_finished) {
            if let Some(worker) = self.worker.take() {
                worker.join_timeout(self.config.join_timeout);
            }
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
