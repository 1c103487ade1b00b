//! Audio acquisition: PCM formats, devices, and the two producer engines

pub mod buffer;
pub mod capture;
pub mod decoder;
pub mod device;
pub mod format;
pub mod input;
pub mod listener;
pub mod output;
pub mod playback;
pub mod source;
pub mod worker;

pub use capture::{CaptureEngine, CaptureState};
pub use decoder::SampleDecoder;
pub use device::{
    list_input_devices, list_output_devices, AudioBackend, AudioDeviceInfo, CpalBackend,
    InputDevice, OutputDevice,
};
pub use format::{AudioFormat, RawFrame};
pub use listener::{ErrorHook, FrameListener, ListenerSet};
pub use playback::{PlaybackEngine, PlaybackState};
pub use source::SourceInfo;
pub use worker::CancelToken;
