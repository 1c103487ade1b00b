mod common;

use common::{wait_until, write_wav, MockBackend};
use pcm_scope::audio::{FrameListener, PlaybackEngine, PlaybackState, RawFrame};
use pcm_scope::spectrum::{AnalysisSnapshot, StreamAnalyzer};
use pcm_scope::{PlaybackConfig, ScopeError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// 100 ms of stereo 16-bit audio, 35 chunks of 512 bytes
const SHORT_FRAMES: usize = 4410;

fn engine(backend: &MockBackend) -> PlaybackEngine {
    common::init_tracing();
    PlaybackEngine::new(backend.shared(), PlaybackConfig::default())
}

/// Collects every byte delivered to listeners
fn collector(engine: &PlaybackEngine) -> Arc<Mutex<Vec<u8>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.add_frame_listener(Arc::new(move |frame: RawFrame| {
        sink.lock().unwrap().extend_from_slice(frame.bytes());
    }));
    seen
}

#[test]
fn test_seek_half_of_one_second_file() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "one_second.wav", 2, 44100);
    let backend = MockBackend::new();
    let mut engine = engine(&backend);

    let info = engine.load_file(&path).unwrap();
    assert_eq!(info.total_bytes, 44100 * 4);
    assert_eq!(info.total_bytes as usize, pcm.len());
    assert!((engine.total_duration_seconds() - 1.0).abs() < 1e-9);

    let target = engine.seek(0.5).unwrap();
    assert_eq!(target % 4, 0);
    assert_eq!(target, 88200);
    assert_eq!(engine.seek_position(), 88200);
    assert!((engine.progress() - 0.5).abs() < 1e-9);
    assert!((engine.current_time_seconds() - 0.5).abs() < 1e-9);

    // Seeking an idle engine opens nothing
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 0);
}

#[test]
fn test_plays_whole_file_then_stops_at_end() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::new();
    let mut engine = engine(&backend);
    let seen = collector(&engine);

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));

    assert_eq!(backend.state.written(), pcm);
    assert_eq!(*seen.lock().unwrap(), pcm);
    assert_eq!(engine.progress(), 1.0);
    assert_eq!(engine.bytes_played(), pcm.len() as u64);
    assert_eq!(engine.seek_position(), 0);
    assert_eq!(backend.state.open_devices(), 0);
    assert!(engine.take_last_error().is_none());

    // The next play starts over
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));
    assert_eq!(backend.state.written().len(), pcm.len() * 2);
    assert_eq!(&backend.state.written()[pcm.len()..], &pcm[..]);
}

#[test]
fn test_pause_resume_has_no_gaps_or_duplicates() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::with_delay(Duration::from_millis(2));
    let mut engine = engine(&backend);
    let seen = collector(&engine);

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || backend.state.written().len() >= 2048));

    engine.pause();
    assert!(engine.is_paused());

    // At most one in-flight chunk lands after the pause
    thread::sleep(Duration::from_millis(30));
    let paused_at = backend.state.written().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.state.written().len(), paused_at);
    assert!(paused_at < pcm.len());
    assert_eq!(engine.bytes_played(), paused_at as u64);
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 1);

    engine.play().unwrap();
    assert!(engine.is_playing());
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));

    // Resume reused the paused worker
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 1);
    assert_eq!(backend.state.written(), pcm);
    assert_eq!(*seen.lock().unwrap(), pcm);
}

#[test]
fn test_seek_while_paused_resumes_from_target() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::with_delay(Duration::from_millis(2));
    let mut engine = engine(&backend);

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || backend.state.written().len() >= 1024));
    engine.pause();
    thread::sleep(Duration::from_millis(30));
    let paused_at = backend.state.written().len();

    let target = engine.seek(0.5).unwrap() as usize;
    assert_eq!(target, pcm.len() / 2);
    assert!(paused_at < target);
    assert!(engine.is_paused());
    assert_eq!(backend.state.open_devices(), 0);

    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));

    let mut expected = pcm[..paused_at].to_vec();
    expected.extend_from_slice(&pcm[target..]);
    assert_eq!(backend.state.written(), expected);
}

#[test]
fn test_seek_while_playing_restarts() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::with_delay(Duration::from_millis(2));
    let mut engine = engine(&backend);

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || backend.state.written().len() >= 1024));

    let target = engine.seek(0.75).unwrap() as usize;
    assert_eq!(target % 4, 0);
    assert!(engine.is_playing());

    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));
    assert!(backend.state.written().ends_with(&pcm[target..]));
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 2);
    assert_eq!(backend.state.open_devices(), 0);
}

#[test]
fn test_stop_then_immediate_restart() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_wav(dir.path(), "long.wav", 2, 44100);
    let backend = MockBackend::with_delay(Duration::from_millis(1));
    let mut engine = engine(&backend);
    engine.load_file(&path).unwrap();

    let started = Instant::now();
    for _ in 0..20 {
        engine.play().unwrap();
        assert!(engine.is_playing());
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.bytes_played(), 0);
        assert_eq!(backend.state.open_devices(), 0);
    }
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 20);
}

#[test]
fn test_write_failure_stops_and_releases_device() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::new();
    *backend.state.fail_after.lock().unwrap() = Some(3);
    let mut engine = engine(&backend);
    let seen = collector(&engine);

    let hook_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&hook_calls);
    engine.set_error_hook(Some(Arc::new(move |err: &ScopeError| {
        assert!(matches!(err, ScopeError::DeviceFailure { .. }));
        calls.fetch_add(1, Ordering::SeqCst);
    })));

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));

    assert!(matches!(
        engine.take_last_error(),
        Some(ScopeError::DeviceFailure { .. })
    ));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.state.open_devices(), 0);
    // Listeners only see chunks the device accepted
    assert_eq!(*seen.lock().unwrap(), pcm[..1024].to_vec());

    // No automatic retry, but an explicit play works again
    *backend.state.fail_after.lock().unwrap() = None;
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));
    assert!(backend.state.written().ends_with(&pcm));
}

#[test]
fn test_device_open_failure_is_returned() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::new();
    *backend.state.refuse_open.lock().unwrap() = Some(ScopeError::DeviceBusy {
        device: "mock output".to_string(),
        reason: "in use".to_string(),
    });
    let mut engine = engine(&backend);
    engine.load_file(&path).unwrap();

    assert!(matches!(
        engine.play(),
        Err(ScopeError::DeviceBusy { device, .. }) if device == "mock output"
    ));
    assert_eq!(engine.state(), PlaybackState::Stopped);
}

#[test]
fn test_load_errors() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let mut engine = engine(&backend);

    let missing = dir.path().join("missing.wav");
    assert!(matches!(
        engine.load_file(&missing),
        Err(ScopeError::FileNotFound { path }) if path == missing
    ));

    let text = dir.path().join("notes.wav");
    std::fs::write(&text, b"definitely not a RIFF header").unwrap();
    assert!(matches!(
        engine.load_file(&text),
        Err(ScopeError::UnsupportedFormat { .. })
    ));

    assert_eq!(engine.play(), Err(ScopeError::NoSourceLoaded));
    assert_eq!(engine.seek(0.5), Err(ScopeError::NoSourceLoaded));
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 0);
}

#[test]
fn test_load_stops_active_playback() {
    let dir = TempDir::new().unwrap();
    let (first, _) = write_wav(dir.path(), "first.wav", 2, 44100);
    let (second, _) = write_wav(dir.path(), "second.wav", 1, SHORT_FRAMES);
    let backend = MockBackend::with_delay(Duration::from_millis(1));
    let mut engine = engine(&backend);

    engine.load_file(&first).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || !backend.state.written().is_empty()));

    let info = engine.load_file(&second).unwrap();
    assert_eq!(info.format.channels, 1);
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(engine.bytes_played(), 0);
    assert_eq!(backend.state.open_devices(), 0);
}

#[test]
fn test_drop_releases_device() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_wav(dir.path(), "long.wav", 2, 44100);
    let backend = MockBackend::with_delay(Duration::from_millis(1));

    {
        let mut engine = engine(&backend);
        engine.load_file(&path).unwrap();
        engine.play().unwrap();
        assert!(wait_until(WAIT, || !backend.state.written().is_empty()));
    }

    assert_eq!(backend.state.open_devices(), 0);
}

#[test]
fn test_analyzer_fed_by_playback() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::new();
    let mut engine = engine(&backend);

    let analyzer = Arc::new(StreamAnalyzer::new(1024).unwrap());
    let snapshots = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&snapshots);
    analyzer.set_analysis_listener(Some(Arc::new(move |snapshot: AnalysisSnapshot| {
        assert_eq!(snapshot.waveform.len(), 1024);
        assert_eq!(snapshot.spectrum.len(), 512);
        count.fetch_add(1, Ordering::SeqCst);
    })));
    let listener: Arc<dyn FrameListener> = analyzer.clone();
    engine.add_frame_listener(listener);

    engine.load_file(&path).unwrap();
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));

    // 17640 bytes in 512-byte chunks
    assert_eq!(snapshots.load(Ordering::SeqCst), 35);
    let snapshot = analyzer.snapshot();
    assert!(snapshot.waveform.iter().any(|&s| s != 0.0));
    assert!(snapshot.spectrum.iter().all(|&m| m >= 0.0));
}

#[test]
fn test_stop_detaches_stuck_worker_and_restart_is_unaffected() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_wav(dir.path(), "long.wav", 2, 44100);
    let backend = MockBackend::with_delay(Duration::from_millis(300));
    common::init_tracing();
    let config = PlaybackConfig {
        join_timeout: Duration::from_millis(50),
        ..PlaybackConfig::default()
    };
    let mut engine = PlaybackEngine::new(backend.shared(), config);
    engine.load_file(&path).unwrap();

    engine.play().unwrap();
    assert!(wait_until(WAIT, || backend.state.writes.load(Ordering::SeqCst) >= 1));

    let started = Instant::now();
    engine.stop();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(engine.state(), PlaybackState::Stopped);

    engine.play().unwrap();
    assert_eq!(backend.state.opened_total.load(Ordering::SeqCst), 2);

    // The detached worker finishes its write, then releases its device
    assert!(wait_until(WAIT, || backend.state.open_devices() == 1));
    assert_eq!(engine.state(), PlaybackState::Playing);
    assert!(engine.take_last_error().is_none());

    engine.pause();
    thread::sleep(Duration::from_millis(400));
    assert!(engine.is_paused());
    // The stale chunk reached the device but was never counted or delivered
    assert_eq!(
        engine.bytes_played() as usize,
        backend.state.written().len() - 512
    );

    drop(engine);
    assert!(wait_until(WAIT, || backend.state.open_devices() == 0));
}

#[test]
fn test_device_open_that_hangs_times_out() {
    let dir = TempDir::new().unwrap();
    let (path, pcm) = write_wav(dir.path(), "short.wav", 2, SHORT_FRAMES);
    let backend = MockBackend::new();
    *backend.state.open_delay.lock().unwrap() = Duration::from_millis(300);
    common::init_tracing();
    let config = PlaybackConfig {
        open_timeout: Duration::from_millis(50),
        ..PlaybackConfig::default()
    };
    let mut engine = PlaybackEngine::new(backend.shared(), config);
    engine.load_file(&path).unwrap();

    let started = Instant::now();
    assert!(matches!(
        engine.play(),
        Err(ScopeError::DeviceUnavailable { device, .. }) if device == "output"
    ));
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(engine.state(), PlaybackState::Stopped);

    // The late device is released without playing anything
    assert!(wait_until(WAIT, || {
        backend.state.opened_total.load(Ordering::SeqCst) == 1
            && backend.state.open_devices() == 0
    }));
    assert!(backend.state.written().is_empty());
    assert_eq!(engine.state(), PlaybackState::Stopped);

    *backend.state.open_delay.lock().unwrap() = Duration::ZERO;
    engine.play().unwrap();
    assert!(wait_until(WAIT, || engine.state() == PlaybackState::Stopped));
    assert_eq!(backend.state.written(), pcm);
}
