//! PCM stream format and the raw frames handed to listeners

/// Linear PCM stream format. Immutable once a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,

    /// Bits per sample (8 or 16 are decodable)
    pub bits_per_sample: u16,

    /// Interleaved channel count
    pub channels: u16,

    /// Byte order of multi-byte samples
    pub big_endian: bool,

    /// Two's complement samples. 8-bit WAV data is unsigned (offset 128).
    pub signed: bool,
}

impl AudioFormat {
    /// Create a signed PCM format
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16, big_endian: bool) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
            big_endian,
            signed: true,
        }
    }

    /// Same format with a different signedness
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Bytes per single-channel sample, rounded up
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize + 7) / 8
    }

    /// Bytes per audio frame (one sample for every channel)
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Byte rate of the stream
    pub fn bytes_per_second(&self) -> f64 {
        self.sample_rate as f64 * self.frame_size() as f64
    }
}

/// A chunk of undecoded PCM bytes as produced by an engine worker.
///
/// Each listener receives its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    data: Vec<u8>,
    valid_bytes: usize,
    format: AudioFormat,
}

impl RawFrame {
    /// Frame where every byte of `data` is valid
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        let valid_bytes = data.len();
        Self {
            data,
            valid_bytes,
            format,
        }
    }

    /// Frame with an explicit valid byte count (clamped to the buffer length)
    pub fn with_valid_bytes(data: Vec<u8>, valid_bytes: usize, format: AudioFormat) -> Self {
        let valid_bytes = valid_bytes.min(data.len());
        Self {
            data,
            valid_bytes,
            format,
        }
    }

    /// The valid portion of the buffer
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.valid_bytes]
    }

    pub fn valid_bytes(&self) -> usize {
        self.valid_bytes
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Whole audio frames contained in the valid bytes
    pub fn frame_count(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            frame => self.valid_bytes / frame,
        }
    }

    /// Release the underlying buffer
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.valid_bytes);
        self.data
    }
}
