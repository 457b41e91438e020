//! Audio subsystem module
//!
//! The server core only talks to [`AudioBackend`]. Decoding and level
//! handling are shared by every backend; actual output goes through cpal
//! when the `device` feature is enabled.

pub mod decoder;
pub mod level;
pub mod null;

#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "device")]
pub mod playback;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;
use crate::protocol::AudioSource;

pub use decoder::decode_source;
pub use null::NullBackend;

#[cfg(feature = "device")]
pub use playback::CpalBackend;

/// Decoded audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Output device as reported to controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
    pub max_output_channels: u16,
    #[serde(default)]
    pub is_default: bool,
}

/// Boundary between the server core and whatever renders audio
///
/// Implementations may block; the dispatcher only calls them from worker
/// threads.
pub trait AudioBackend: Send + Sync {
    /// Decode a source into a clip
    fn load(&self, source: &AudioSource) -> Result<AudioClip, AudioError> {
        decode_source(source)
    }

    /// Start playing a clip, replacing anything already playing
    fn play(&self, clip: AudioClip, level: Option<f64>, device_id: Option<u32>)
        -> Result<(), AudioError>;

    /// Stop playback; a no-op when nothing is playing
    fn stop(&self) -> Result<(), AudioError>;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_frames() {
        let clip = AudioClip::new(vec![0.0; 960], 48000, 2);
        assert_eq!(clip.frames(), 480);
        assert!((clip.duration_secs() - 0.01).abs() < 1e-9);

        let empty = AudioClip::new(Vec::new(), 0, 0);
        assert_eq!(empty.frames(), 0);
        assert_eq!(empty.duration_secs(), 0.0);
    }
}
