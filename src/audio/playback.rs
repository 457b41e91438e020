//! Playback to an output device
//!
//! Each clip plays on its own thread that owns the cpal stream; the stream
//! is not `Send`, so it is built and dropped on that thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::{get_output_device, list_output_devices, max_output_channels};
use super::{level, AudioBackend, AudioClip, DeviceInfo};
use crate::error::AudioError;

/// A clip currently being rendered
struct ActivePlayback {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ActivePlayback {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ActivePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// cpal output backend
pub struct CpalBackend {
    active: Mutex<Option<ActivePlayback>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|p| p.running.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn play(&self, mut clip: AudioClip, level: Option<f64>, device_id: Option<u32>) -> Result<(), AudioError> {
        self.stop()?;

        let device = get_output_device(device_id)?;
        let outputs = max_output_channels(&device);
        if outputs == 0 {
            return Err(AudioError::DeviceNotFound(format!(
                "{} has no output channels",
                device.name().unwrap_or_default()
            )));
        }

        level::apply_level(&mut clip, level)?;

        let channels = clip.channels.min(outputs);
        if channels < clip.channels {
            tracing::warn!(
                "{}-channel clip, but only {} device outputs; dropping {} channels",
                clip.channels,
                outputs,
                clip.channels - channels
            );
        }
        let samples = level::fit_channels(&clip, channels);

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(clip.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::new(AtomicBool::new(true));
        let running_for_callback = running.clone();
        let running_for_loop = running.clone();
        let (started_tx, started_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let mut position = 0usize;
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for out in data.iter_mut() {
                            *out = match samples.get(position) {
                                Some(&s) => s,
                                None => {
                                    running_for_callback.store(false, Ordering::Relaxed);
                                    0.0
                                }
                            };
                            position += 1;
                        }
                    },
                    |err| {
                        tracing::error!("Output stream error: {}", err);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = started_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = started_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = started_tx.send(Ok(()));

                // Keep the stream alive until the clip ends or stop() is called
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut playback = ActivePlayback {
            running,
            thread_handle: Some(handle),
        };

        match started_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Playing {:.2}s on {} channels", clip.duration_secs(), channels);
                *self.active.lock() = Some(playback);
                Ok(())
            }
            Ok(Err(e)) => {
                playback.stop();
                Err(e)
            }
            Err(_) => {
                playback.stop();
                Err(AudioError::StreamError("playback thread exited".to_string()))
            }
        }
    }

    fn stop(&self) -> Result<(), AudioError> {
        let active = self.active.lock().take();
        if let Some(mut playback) = active {
            playback.stop();
        }
        Ok(())
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        list_output_devices()
    }
}
