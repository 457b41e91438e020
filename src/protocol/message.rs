//! Request and response values carried by frames

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AudioError, ValidationError};

/// Where the audio to play comes from
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// A file on the host's filesystem
    Path(PathBuf),
    /// Audio file contents sent over the wire
    Bytes(Bytes),
}

impl AudioSource {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Path(path) => path.display().to_string(),
            AudioSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Decoded intent of one request frame
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlayFile {
        source: AudioSource,
        /// Presentation level in dB; `None` normalises the clip
        level: Option<f64>,
        /// Overrides the selected device for this playback only
        device_id: Option<i64>,
    },
    StopPlayback,
    SetDevice { device_id: i64 },
    Ping,
    ListDevices,
}

impl Action {
    /// Command name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Action::PlayFile { .. } => "play",
            Action::StopPlayback => "stop",
            Action::SetDevice { .. } => "set-device",
            Action::Ping => "ping",
            Action::ListDevices => "list-devices",
        }
    }
}

/// Command names accepted in `command/json` payloads
pub const COMMAND_NAMES: &[&str] = &["play", "stop", "set-device", "ping", "list-devices"];

/// JSON shape of a `command/json` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub(crate) enum Command {
    Play {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id: Option<i64>,
    },
    Stop,
    SetDevice {
        device_id: i64,
    },
    Ping,
    ListDevices,
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        match command {
            Command::Play { path, level, device_id } => Action::PlayFile {
                source: AudioSource::Path(path),
                level,
                device_id,
            },
            Command::Stop => Action::StopPlayback,
            Command::SetDevice { device_id } => Action::SetDevice { device_id },
            Command::Ping => Action::Ping,
            Command::ListDevices => Action::ListDevices,
        }
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
    Ok,
    AudioError,
    ValidationError,
    /// The audio worker queue was full; the request was not run
    Busy,
}

/// Server reply to one request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            result: ResultCode::Ok,
            message: None,
            data: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Trivial acknowledgement for `ping`
    pub fn pong() -> Self {
        Self::ok_with_message("pong")
    }

    pub fn audio_error(err: &AudioError) -> Self {
        Self {
            result: ResultCode::AudioError,
            message: Some(err.to_string()),
            data: None,
        }
    }

    pub fn validation_error(err: &ValidationError) -> Self {
        Self {
            result: ResultCode::ValidationError,
            message: Some(err.to_string()),
            data: None,
        }
    }

    pub fn busy() -> Self {
        Self {
            result: ResultCode::Busy,
            message: Some("audio worker queue full".to_string()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_names() {
        for name in COMMAND_NAMES {
            let raw = match *name {
                "play" => r#"{"command":"play","path":"a.wav"}"#.to_string(),
                "set-device" => r#"{"command":"set-device","device_id":1}"#.to_string(),
                other => format!(r#"{{"command":"{}"}}"#, other),
            };
            let command: Command = serde_json::from_str(&raw).unwrap();
            assert_eq!(Action::from(command).name(), *name);
        }
    }

    #[test]
    fn test_play_command_optional_fields() {
        let command: Command =
            serde_json::from_str(r#"{"command":"play","path":"tone.wav","level":-12.5}"#).unwrap();
        assert_eq!(
            Action::from(command),
            Action::PlayFile {
                source: AudioSource::Path(PathBuf::from("tone.wav")),
                level: Some(-12.5),
                device_id: None,
            }
        );
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_value(Response::pong()).unwrap();
        assert_eq!(json, serde_json::json!({"result": "ok", "message": "pong"}));

        let err = ValidationError::DeviceOutOfRange { id: 5, known: vec![0, 1] };
        let json = serde_json::to_value(Response::validation_error(&err)).unwrap();
        assert_eq!(json["result"], "validation-error");
    }
}
