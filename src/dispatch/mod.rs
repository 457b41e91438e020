//! Request dispatch
//!
//! [`Dispatcher`] turns an [`Action`] into calls on the audio backend and a
//! [`Response`]. Those calls may block, so the reactor never calls it
//! directly: requests go through a [`WorkerPool`] and come back over a
//! completion channel.

pub mod worker;

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::AudioBackend;
use crate::error::{AudioError, ValidationError};
use crate::protocol::{Action, AudioSource, Response};

pub use worker::{DispatchHandle, WorkerPool};

/// Defaults applied when a request leaves something unspecified
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DispatchDefaults {
    /// Device used until a controller selects one
    pub device_id: Option<u32>,
    /// Level used when a play request carries none; `None` normalises
    pub level: Option<f64>,
}

pub struct Dispatcher {
    backend: Arc<dyn AudioBackend>,
    selected_device: Mutex<Option<u32>>,
    default_level: Option<f64>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn AudioBackend>, defaults: DispatchDefaults) -> Self {
        Self {
            backend,
            selected_device: Mutex::new(defaults.device_id),
            default_level: defaults.level,
        }
    }

    /// Device used for playback when a request does not name one
    pub fn selected_device(&self) -> Option<u32> {
        *self.selected_device.lock()
    }

    /// Run one action against the backend
    pub fn dispatch(&self, action: Action) -> Response {
        match action {
            Action::Ping => Response::pong(),
            Action::PlayFile {
                source,
                level,
                device_id,
            } => self.play(source, level.or(self.default_level), device_id),
            Action::StopPlayback => match self.backend.stop() {
                Ok(()) => Response::ok_with_message("stopped"),
                Err(e) => {
                    tracing::warn!("Stop failed: {}", e);
                    Response::audio_error(&e)
                }
            },
            Action::SetDevice { device_id } => self.set_device(device_id),
            Action::ListDevices => match self.backend.enumerate_devices() {
                Ok(devices) => match serde_json::to_value(&devices) {
                    Ok(data) => Response::ok().with_data(data),
                    Err(e) => Response::audio_error(&AudioError::DeviceNotFound(e.to_string())),
                },
                Err(e) => Response::audio_error(&e),
            },
        }
    }

    fn play(&self, source: AudioSource, level: Option<f64>, device_id: Option<i64>) -> Response {
        let device_id = match device_id {
            Some(requested) => match self.validate_device(requested) {
                Ok(id) => Some(id),
                Err(response) => return response,
            },
            None => self.selected_device(),
        };
        let description = source.describe();

        let result = self
            .backend
            .load(&source)
            .and_then(|clip| self.backend.play(clip, level, device_id));

        match result {
            Ok(()) => {
                tracing::info!("Playing {} (level {:?}, device {:?})", description, level, device_id);
                Response::ok_with_message(format!("playing {}", description))
            }
            Err(e) => {
                tracing::warn!("Cannot play {}: {}", description, e);
                Response::audio_error(&e)
            }
        }
    }

    fn set_device(&self, device_id: i64) -> Response {
        match self.validate_device(device_id) {
            Ok(id) => {
                *self.selected_device.lock() = Some(id);
                tracing::info!("Selected output device {}", id);
                Response::ok_with_message(format!("device {} selected", id))
            }
            Err(response) => response,
        }
    }

    /// Check a wire device id against the backend's device list
    fn validate_device(&self, device_id: i64) -> Result<u32, Response> {
        let devices = self
            .backend
            .enumerate_devices()
            .map_err(|e| Response::audio_error(&e))?;

        u32::try_from(device_id)
            .ok()
            .filter(|id| devices.iter().any(|d| d.id == *id))
            .ok_or_else(|| {
                let err = ValidationError::DeviceOutOfRange {
                    id: device_id,
                    known: devices.iter().map(|d| d.id).collect(),
                };
                tracing::warn!("{}", err);
                Response::validation_error(&err)
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::{AudioClip, DeviceInfo};
    use crate::protocol::ResultCode;
    use bytes::Bytes;

    /// Backend that records calls instead of producing sound
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub device_ids: Vec<u32>,
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        pub fn with_devices(ids: &[u32]) -> Self {
            Self {
                device_ids: ids.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl AudioBackend for RecordingBackend {
        fn load(&self, source: &AudioSource) -> Result<AudioClip, AudioError> {
            self.calls.lock().push(format!("load {}", source.describe()));
            match source {
                AudioSource::Path(p) if p.to_str() == Some("missing.wav") => {
                    Err(AudioError::FileNotFound("missing.wav".to_string()))
                }
                _ => Ok(AudioClip::new(vec![0.0; 4], 48000, 2)),
            }
        }

        fn play(&self, _clip: AudioClip, level: Option<f64>, device_id: Option<u32>) -> Result<(), AudioError> {
            self.calls.lock().push(format!("play {:?} {:?}", level, device_id));
            Ok(())
        }

        fn stop(&self) -> Result<(), AudioError> {
            self.calls.lock().push("stop".to_string());
            Ok(())
        }

        fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
            self.calls.lock().push("enumerate".to_string());
            Ok(self
                .device_ids
                .iter()
                .map(|&id| DeviceInfo {
                    id,
                    name: format!("out {}", id),
                    max_output_channels: 2,
                    is_default: id == 0,
                })
                .collect())
        }
    }

    fn dispatcher(ids: &[u32]) -> (Arc<RecordingBackend>, Dispatcher) {
        let backend = Arc::new(RecordingBackend::with_devices(ids));
        let dispatcher = Dispatcher::new(backend.clone(), DispatchDefaults::default());
        (backend, dispatcher)
    }

    #[test]
    fn test_set_device_in_range() {
        let (_, d) = dispatcher(&[0, 1, 2]);
        let response = d.dispatch(Action::SetDevice { device_id: 2 });
        assert!(response.is_ok());
        assert_eq!(d.selected_device(), Some(2));
    }

    #[test]
    fn test_set_device_out_of_range() {
        let (_, d) = dispatcher(&[0, 1]);
        let response = d.dispatch(Action::SetDevice { device_id: 2 });
        assert_eq!(response.result, ResultCode::ValidationError);
        assert_eq!(d.selected_device(), None);

        let response = d.dispatch(Action::SetDevice { device_id: -1 });
        assert_eq!(response.result, ResultCode::ValidationError);
    }

    #[test]
    fn test_ping_skips_backend() {
        let (backend, d) = dispatcher(&[0]);
        assert_eq!(d.dispatch(Action::Ping), Response::pong());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_play_uses_selected_device() {
        let (backend, d) = dispatcher(&[0, 1]);
        d.dispatch(Action::SetDevice { device_id: 1 });

        let response = d.dispatch(Action::PlayFile {
            source: AudioSource::Bytes(Bytes::from_static(b"wav")),
            level: Some(-10.0),
            device_id: None,
        });
        assert!(response.is_ok());
        assert_eq!(backend.calls().last().unwrap(), "play Some(-10.0) Some(1)");
    }

    #[test]
    fn test_play_device_validated() {
        let (backend, d) = dispatcher(&[0, 1]);

        for bad in [-1, 7] {
            let response = d.dispatch(Action::PlayFile {
                source: AudioSource::Path("tone.wav".into()),
                level: None,
                device_id: Some(bad),
            });
            assert_eq!(response.result, ResultCode::ValidationError);
        }
        assert!(!backend.calls().iter().any(|c| c.starts_with("load")));

        let response = d.dispatch(Action::PlayFile {
            source: AudioSource::Path("tone.wav".into()),
            level: None,
            device_id: Some(1),
        });
        assert!(response.is_ok());
        assert_eq!(backend.calls().last().unwrap(), "play None Some(1)");
        // Per-request override leaves the selection alone
        assert_eq!(d.selected_device(), None);
    }

    #[test]
    fn test_play_missing_file_is_audio_error() {
        let (_, d) = dispatcher(&[0]);
        let response = d.dispatch(Action::PlayFile {
            source: AudioSource::Path("missing.wav".into()),
            level: None,
            device_id: None,
        });
        assert_eq!(response.result, ResultCode::AudioError);
        assert!(response.message.unwrap().contains("missing.wav"));
    }

    #[test]
    fn test_default_level_applies() {
        let backend = Arc::new(RecordingBackend::with_devices(&[0]));
        let d = Dispatcher::new(
            backend.clone(),
            DispatchDefaults {
                device_id: Some(0),
                level: Some(-30.0),
            },
        );
        d.dispatch(Action::PlayFile {
            source: AudioSource::Path("tone.wav".into()),
            level: None,
            device_id: None,
        });
        assert_eq!(backend.calls().last().unwrap(), "play Some(-30.0) Some(0)");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_, d) = dispatcher(&[0]);
        assert!(d.dispatch(Action::StopPlayback).is_ok());
        assert!(d.dispatch(Action::StopPlayback).is_ok());
    }

    #[test]
    fn test_list_devices() {
        let (_, d) = dispatcher(&[0, 3]);
        let response = d.dispatch(Action::ListDevices);
        let devices: Vec<DeviceInfo> = serde_json::from_value(response.data.unwrap()).unwrap();
        assert_eq!(devices.iter().map(|d| d.id).collect::<Vec<_>>(), vec![0, 3]);
    }
}
