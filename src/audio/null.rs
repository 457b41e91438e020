//! Backend without an output device
//!
//! Decodes and level-checks everything exactly like a real backend, then
//! drops the samples. Used when the crate is built without the `device`
//! feature.

use parking_lot::Mutex;

use super::{level, AudioBackend, AudioClip, DeviceInfo};
use crate::error::AudioError;

pub struct NullBackend {
    devices: Vec<DeviceInfo>,
    playing: Mutex<Option<AudioClip>>,
}

impl NullBackend {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            playing: Mutex::new(None),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.lock().is_some()
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(vec![DeviceInfo {
            id: 0,
            name: "null output".to_string(),
            max_output_channels: 2,
            is_default: true,
        }])
    }
}

impl AudioBackend for NullBackend {
    fn play(&self, mut clip: AudioClip, level: Option<f64>, device_id: Option<u32>) -> Result<(), AudioError> {
        let device = match device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))?,
            None => self
                .devices
                .iter()
                .find(|d| d.is_default)
                .or_else(|| self.devices.first())
                .ok_or_else(|| AudioError::DeviceNotFound("no output devices".to_string()))?,
        };

        level::apply_level(&mut clip, level)?;
        let outputs = clip.channels.min(device.max_output_channels);
        clip.samples = level::fit_channels(&clip, outputs);
        clip.channels = outputs.max(1);

        tracing::info!(
            "Null output '{}': {:.2}s, {} channels, {:.1} dBFS RMS",
            device.name,
            clip.duration_secs(),
            clip.channels,
            level::mag_to_db(level::rms(&clip.samples) as f64)
        );
        *self.playing.lock() = Some(clip);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.playing.lock().take();
        Ok(())
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        Ok(self.devices.clone())
    }
}
