//! File playback engine
//!
//! A dedicated worker thread reads fixed-size PCM chunks from the loaded
//! file, writes each chunk to the output device, then hands a copy to every
//! registered frame listener before reading the next one.
//!
//! State machine:
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --play--> Playing
//! Playing | Paused --stop--> Stopped
//! ```
//!
//! Pausing is cooperative: the worker parks on a condition variable at the
//! top of its loop, so a pause is observed with at most one chunk of latency.

use super::device::{AudioBackend, OutputDevice};
use super::format::{AudioFormat, RawFrame};
use super::listener::{ErrorHook, ErrorSink, FrameListener, ListenerSet};
use super::source::{PcmReader, SourceInfo};
use super::worker::{CancelToken, Worker};
use crate::config::{frame_aligned_chunk, PlaybackConfig};
use crate::error::{Result, ScopeError};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

struct Control {
    state: PlaybackState,
    /// Byte offset the next worker starts from
    seek_position: u64,
    /// Incremented whenever a worker is started or torn down, so a worker
    /// that outlived its join timeout cannot clobber newer state
    session: u64,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    bytes_played: AtomicU64,
    listeners: ListenerSet,
    errors: ErrorSink,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park while paused. Returns false once the worker should exit.
    fn wait_while_paused(&self, cancel: &CancelToken) -> bool {
        let mut control = self.lock();
        while control.state == PlaybackState::Paused && !cancel.is_cancelled() {
            control = self
                .wake
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !cancel.is_cancelled()
    }

    /// Terminal transition from the worker. Ignored for stale sessions.
    fn finish(&self, session: u64, rewind: bool) -> bool {
        let mut control = self.lock();
        if control.session != session {
            return false;
        }
        control.state = PlaybackState::Stopped;
        if rewind {
            control.seek_position = 0;
        }
        true
    }

    /// Retire `session` without waiting for its worker
    fn abandon(&self, session: u64) {
        let mut control = self.lock();
        if control.session == session {
            control.state = PlaybackState::Stopped;
            control.session += 1;
            self.wake.notify_all();
        }
    }
}

/// Why the worker loop returned
enum Exit {
    EndOfStream,
    Cancelled,
}

/// Everything one worker run needs, moved onto the worker thread
struct PlaybackJob {
    shared: Arc<Shared>,
    backend: Arc<dyn AudioBackend>,
    source: SourceInfo,
    start_offset: u64,
    chunk_size: usize,
    session: u64,
}

impl PlaybackJob {
    fn run(self, cancel: CancelToken, init_tx: Sender<Result<()>>) {
        let opened = PcmReader::open(&self.source, self.start_offset).and_then(|reader| {
            let device = self.backend.open_output(&self.source.format)?;
            Ok((reader, device))
        });

        let (mut reader, mut device) = match opened {
            Ok(pair) => {
                if cancel.is_cancelled() {
                    tracing::debug!("Output opened after play() gave up, releasing it");
                    return;
                }
                let _ = init_tx.send(Ok(()));
                pair
            }
            Err(e) => {
                self.shared.finish(self.session, false);
                let _ = init_tx.send(Err(e));
                return;
            }
        };

        let outcome = self.stream(&mut reader, device.as_mut(), &cancel);
        let device_name = device.name().to_string();
        drop(device);

        match outcome {
            Ok(Exit::EndOfStream) => tracing::debug!("Playback completed"),
            Ok(Exit::Cancelled) => tracing::debug!("Playback worker cancelled"),
            Err(e) => {
                tracing::error!("Playback on '{}' failed: {}", device_name, e);
                if self.shared.lock().session == self.session {
                    self.shared.errors.report(e);
                }
            }
        }
        self.shared.finish(self.session, true);
    }

    fn stream(
        &self,
        reader: &mut PcmReader,
        device: &mut dyn OutputDevice,
        cancel: &CancelToken,
    ) -> Result<Exit> {
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            if !self.shared.wait_while_paused(cancel) {
                return Ok(Exit::Cancelled);
            }

            let n = reader.read_chunk(&mut buf)?;
            if n == 0 {
                device.drain(cancel)?;
                return Ok(Exit::EndOfStream);
            }

            device.write(&buf[..n], cancel)?;
            if cancel.is_cancelled() {
                return Ok(Exit::Cancelled);
            }

            self.shared
                .bytes_played
                .fetch_add(n as u64, Ordering::SeqCst);
            self.shared
                .listeners
                .notify(&RawFrame::new(buf[..n].to_vec(), self.source.format));
        }
    }
}

/// Streams a PCM file to an output device and to frame listeners
pub struct PlaybackEngine {
    config: PlaybackConfig,
    backend: Arc<dyn AudioBackend>,
    shared: Arc<Shared>,
    source: Option<SourceInfo>,
    worker: Option<Worker>,
}

impl PlaybackEngine {
    /// Create a stopped engine with nothing loaded
    pub fn new(backend: Arc<dyn AudioBackend>, config: PlaybackConfig) -> Self {
        Self {
            config,
            backend,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: PlaybackState::Stopped,
                    seek_position: 0,
                    session: 0,
                }),
                wake: Condvar::new(),
                bytes_played: AtomicU64::new(0),
                listeners: ListenerSet::new(),
                errors: ErrorSink::default(),
            }),
            source: None,
            worker: None,
        }
    }

    /// Register a listener for every chunk written to the device
    pub fn add_frame_listener(&self, listener: Arc<dyn FrameListener>) {
        self.shared.listeners.add(listener);
    }

    /// Observer for errors that terminate the worker
    pub fn set_error_hook(&self, hook: Option<ErrorHook>) {
        self.shared.errors.set_hook(hook);
    }

    /// The error that last terminated a worker, if any
    pub fn take_last_error(&self) -> Option<ScopeError> {
        self.shared.errors.take_last()
    }

    /// Validate and open `path`, reading its format and length.
    ///
    /// Any active playback is stopped first. No thread is started.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&SourceInfo> {
        let path = path.as_ref();
        self.stop();
        self.source = None;

        let info = SourceInfo::probe(path).map_err(|e| {
            tracing::error!("Failed to load {}: {}", path.display(), e);
            e
        })?;

        tracing::info!(
            "Loaded file: {} ({} Hz, {}-bit, {} channels, {} bytes)",
            path.display(),
            info.format.sample_rate,
            info.format.bits_per_sample,
            info.format.channels,
            info.total_bytes
        );

        Ok(self.source.insert(info))
    }

    /// Start, or resume if paused
    pub fn play(&mut self) -> Result<()> {
        let source = self.source.clone().ok_or(ScopeError::NoSourceLoaded)?;
        self.reap_finished();

        let (session, start_offset) = {
            let mut control = self.shared.lock();
            if self.worker.is_some() {
                match control.state {
                    PlaybackState::Paused => {
                        control.state = PlaybackState::Playing;
                        self.shared.wake.notify_all();
                        tracing::debug!("Resumed playback");
                        return Ok(());
                    }
                    PlaybackState::Playing => return Ok(()),
                    PlaybackState::Stopped => {}
                }
            }
            control.state = PlaybackState::Playing;
            control.session += 1;
            (control.session, control.seek_position)
        };

        // A worker that reached end of stream but has not exited yet
        if let Some(previous) = self.worker.take() {
            previous.join_timeout(self.config.join_timeout);
        }

        self.shared
            .bytes_played
            .store(start_offset, Ordering::SeqCst);

        let job = PlaybackJob {
            shared: Arc::clone(&self.shared),
            backend: Arc::clone(&self.backend),
            chunk_size: frame_aligned_chunk(self.config.chunk_size, &source.format),
            source,
            start_offset,
            session,
        };

        let (init_tx, init_rx) = bounded::<Result<()>>(1);
        let worker = Worker::spawn("audio-playback", move |cancel| job.run(cancel, init_tx))
            .map_err(|e| {
                self.shared.finish(session, false);
                e
            })?;

        match init_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                tracing::info!("Started playback at byte {}", start_offset);
                Ok(())
            }
            Ok(Err(e)) => {
                worker.join_timeout(self.config.join_timeout);
                tracing::error!("Could not start playback: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker releases whatever it opens once it sees the cancel
                worker.cancel();
                self.shared.abandon(session);
                tracing::warn!(
                    "Output device did not open within {:?}, detaching worker",
                    self.config.open_timeout
                );
                Err(ScopeError::DeviceUnavailable {
                    device: "output".to_string(),
                    reason: format!("device did not open within {:?}", self.config.open_timeout),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.join_timeout(self.config.join_timeout);
                self.shared.finish(session, false);
                Err(ScopeError::DeviceUnavailable {
                    device: "output".to_string(),
                    reason: "playback worker exited during initialization".to_string(),
                })
            }
        }
    }

    /// Pause playback; observed by the worker before its next chunk
    pub fn pause(&mut self) {
        let mut control = self.shared.lock();
        if control.state == PlaybackState::Playing && self.worker.is_some() {
            control.state = PlaybackState::Paused;
            tracing::debug!("Paused playback");
        }
    }

    /// Stop playback and rewind to the start
    pub fn stop(&mut self) {
        self.teardown();
        self.shared.lock().seek_position = 0;
        self.shared.bytes_played.store(0, Ordering::SeqCst);
        tracing::debug!("Stopped playback");
    }

    /// Seek to `progress` (0.0 to 1.0) of the file.
    ///
    /// The offset is rounded down to a whole audio frame. An active worker is
    /// torn down; playback restarts immediately if it was playing, while a
    /// paused engine stays paused and resumes from the new offset.
    /// Returns the byte offset.
    pub fn seek(&mut self, progress: f64) -> Result<u64> {
        let source = self.source.as_ref().ok_or(ScopeError::NoSourceLoaded)?;
        let target = seek_target(progress, source.total_bytes, &source.format);

        self.reap_finished();
        let prior = self.state();
        let had_worker = self.worker.is_some();
        if had_worker {
            self.teardown();
        }

        {
            let mut control = self.shared.lock();
            control.seek_position = target;
            if prior == PlaybackState::Paused {
                control.state = PlaybackState::Paused;
            }
        }
        self.shared.bytes_played.store(target, Ordering::SeqCst);
        tracing::debug!("Seeking to {:.1}% (byte {})", progress * 100.0, target);

        if had_worker && prior == PlaybackState::Playing {
            self.play()?;
        }
        Ok(target)
    }

    /// Stop and release everything
    pub fn close(&mut self) {
        self.stop();
        tracing::info!("Playback engine closed");
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// Loaded file metadata
    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.source.as_ref().map(|s| s.format)
    }

    pub fn total_bytes(&self) -> u64 {
        self.source.as_ref().map_or(0, |s| s.total_bytes)
    }

    pub fn bytes_played(&self) -> u64 {
        self.shared.bytes_played.load(Ordering::SeqCst)
    }

    /// Offset the next started worker will begin at
    pub fn seek_position(&self) -> u64 {
        self.shared.lock().seek_position
    }

    /// Fraction of the file played, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        match self.total_bytes() {
            0 => 0.0,
            total => (self.bytes_played() as f64 / total as f64).min(1.0),
        }
    }

    pub fn current_time_seconds(&self) -> f64 {
        self.bytes_to_seconds(self.bytes_played())
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.bytes_to_seconds(self.total_bytes())
    }

    fn bytes_to_seconds(&self, bytes: u64) -> f64 {
        match self.format() {
            Some(format) if format.bytes_per_second() > 0.0 => {
                bytes as f64 / format.bytes_per_second()
            }
            _ => 0.0,
        }
    }

    /// Cancel and join the worker. Leaves the state Stopped.
    fn teardown(&mut self) {
        let worker = self.worker.take();
        if let Some(worker) = &worker {
            worker.cancel();
        }

        {
            let mut control = self.shared.lock();
            control.state = PlaybackState::Stopped;
            control.session += 1;
            self.shared.wake.notify_all();
        }

        if let Some(worker) = worker {
            worker.join_timeout(self.config.join_timeout);
        }
    }

    /// Join a worker that already exited on its own
    fn reap_finished(&mut self) {
        if self.worker.as_ref().is_some_and(Worker::is_finished) {
            if let Some(worker) = self.worker.take() {
                worker.join_timeout(self.config.join_timeout);
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Byte offset for `progress`, clamped to [0, 1] and rounded down to a frame
pub fn seek_target(progress: f64, total_bytes: u64, format: &AudioFormat) -> u64 {
    let progress = if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    };
    let frame = format.frame_size().max(1) as u64;
    let raw = ((progress * total_bytes as f64) as u64).min(total_bytes);
    raw / frame * frame
}
