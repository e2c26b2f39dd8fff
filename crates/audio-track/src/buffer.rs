use std::sync::Arc;
use std::time::Duration;

/// Fully decoded media held in memory as interleaved `f32` samples.
///
/// Cloning is cheap; sample data is shared.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
    codec: Option<String>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples: samples.into(),
            codec: None,
        }
    }

    /// Attach a codec label (for example `FLAC`).
    pub fn with_codec(mut self, codec: Option<String>) -> Self {
        self.codec = codec;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback length; zero when the sample rate is unknown.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}
