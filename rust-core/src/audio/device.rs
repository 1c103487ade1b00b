//! Audio device seams
//!
//! Engines talk to devices through these traits so the worker loops can be
//! driven by cpal in production and by in-memory devices in tests.
//! Devices are opened on the worker thread that uses them and released
//! when that thread drops them.

use super::format::AudioFormat;
use super::input::CpalInput;
use super::output::CpalOutput;
use super::worker::CancelToken;
use crate::error::{Result, ScopeError};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

/// Blocking sink for raw PCM bytes
pub trait OutputDevice {
    fn name(&self) -> &str;

    /// Write a chunk, blocking until the device has accepted all of it.
    ///
    /// Returns early, without error, once `cancel` is set.
    fn write(&mut self, data: &[u8], cancel: &CancelToken) -> Result<()>;

    /// Block until everything written has been played, or `cancel` is set
    fn drain(&mut self, cancel: &CancelToken) -> Result<()>;
}

/// Blocking source of raw PCM bytes in a fixed format
pub trait InputDevice {
    fn name(&self) -> &str;

    fn format(&self) -> AudioFormat;

    /// Read up to `buf.len()` bytes. Returns 0 when nothing arrived within
    /// the device poll interval so the caller can check for cancellation.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Opens devices for the engines
pub trait AudioBackend: Send + Sync {
    fn open_output(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>>;

    fn open_input(&self, format: &AudioFormat) -> Result<Box<dyn InputDevice>>;
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// cpal-backed devices on the default host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    output_device: Option<String>,
    input_device: Option<String>,
}

impl CpalBackend {
    /// Use the platform default input and output devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind playback to a named output device
    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    /// Bind capture to a named input device
    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    fn find_output(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.output_device {
            None => host
                .default_output_device()
                .ok_or_else(|| unavailable("default output", "no output device found")),
            Some(wanted) => host
                .output_devices()
                .map_err(|e| unavailable(wanted, e))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| unavailable(wanted, "no output device with this name")),
        }
    }

    fn find_input(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.input_device {
            None => host
                .default_input_device()
                .ok_or_else(|| unavailable("default input", "no input device found")),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| unavailable(wanted, e))?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| unavailable(wanted, "no input device with this name")),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open_output(&self, format: &AudioFormat) -> Result<Box<dyn OutputDevice>> {
        let device = self.find_output()?;
        Ok(Box::new(CpalOutput::open(device, *format)?))
    }

    fn open_input(&self, format: &AudioFormat) -> Result<Box<dyn InputDevice>> {
        let device = self.find_input()?;
        Ok(Box::new(CpalInput::open(device, *format)?))
    }
}

pub(crate) fn unavailable(device: &str, reason: impl ToString) -> ScopeError {
    ScopeError::DeviceUnavailable {
        device: device.to_string(),
        reason: reason.to_string(),
    }
}

/// Map a cpal stream build failure onto the pipeline taxonomy
pub(crate) fn classify_build_error(device: &str, err: cpal::BuildStreamError) -> ScopeError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable
        | cpal::BuildStreamError::StreamConfigNotSupported => unavailable(device, err),
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(device, err.description),
        other => ScopeError::DeviceBusy {
            device: device.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Backends only report permission problems as free text
pub(crate) fn classify_backend(device: &str, description: String) -> ScopeError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted") {
        ScopeError::AccessDenied {
            resource: format!("{device}: {description}"),
        }
    } else {
        ScopeError::DeviceBusy {
            device: device.to_string(),
            reason: description,
        }
    }
}

/// List available audio input devices
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| unavailable("input devices", e))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;
            Some(AudioDeviceInfo {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect())
}

/// List available audio output devices
pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| unavailable("output devices", e))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_output_config().ok()?;
            Some(AudioDeviceInfo {
                name,
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
            })
        })
        .collect())
}
