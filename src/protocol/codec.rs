//! Wire codec
//!
//! ```text
//! [u16 BE header length] [JSON header: header-length bytes] [payload: content-length bytes]
//! ```
//!
//! Every decoding step returns [`FrameError::Incomplete`] when the slice is
//! too short, so callers can tell "buffer more" apart from malformed input.
//! No I/O happens here.

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{ContentType, Header};
use super::message::{Action, AudioSource, Command, Response, COMMAND_NAMES};
use crate::error::FrameError;

/// Size of the header-length prefix
pub const HEADER_LEN_PREFIX: usize = 2;

/// Default upper bound on a payload (64 MiB)
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 64 * 1024 * 1024;

/// Bounds applied while decoding untrusted frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_header_len: usize,
    pub max_content_length: u64,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_header_len: u16::MAX as usize,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

/// Read the big-endian header-length prefix
pub fn decode_header_len(bytes: &[u8]) -> Result<usize, FrameError> {
    if bytes.len() < HEADER_LEN_PREFIX {
        return Err(FrameError::Incomplete {
            needed: HEADER_LEN_PREFIX - bytes.len(),
        });
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}

/// Parse exactly `len` bytes as a header
pub fn decode_header(bytes: &[u8], len: usize, limits: &FrameLimits) -> Result<Header, FrameError> {
    if len == 0 || len > limits.max_header_len {
        return Err(FrameError::BadHeaderLength(len));
    }
    if bytes.len() < len {
        return Err(FrameError::Incomplete {
            needed: len - bytes.len(),
        });
    }

    let header: Header = serde_json::from_slice(&bytes[..len])
        .map_err(|e| FrameError::MalformedHeader(e.to_string()))?;
    header.validate()?;

    if header.content_length > limits.max_content_length {
        return Err(FrameError::PayloadTooLarge {
            len: header.content_length,
            max: limits.max_content_length,
        });
    }

    Ok(header)
}

/// Decode a request payload into an [`Action`], directed by content type
pub fn decode_payload(bytes: &[u8], header: &Header) -> Result<Action, FrameError> {
    let len = header.content_length as usize;
    if bytes.len() < len {
        return Err(FrameError::Incomplete {
            needed: len - bytes.len(),
        });
    }
    action_from_payload(Bytes::copy_from_slice(&bytes[..len]), header)
}

/// Decode a payload that has already been split off the read buffer
pub fn action_from_payload(payload: Bytes, header: &Header) -> Result<Action, FrameError> {
    match header.content_type {
        ContentType::CommandJson => decode_command(&payload),
        ContentType::AudioBinary => Ok(Action::PlayFile {
            source: AudioSource::Bytes(payload),
            level: header.level,
            device_id: header.device_id,
        }),
        ContentType::ResponseJson => Err(FrameError::UnsupportedContentType(
            "response/json is not a request type".to_string(),
        )),
    }
}

fn decode_command(payload: &[u8]) -> Result<Action, FrameError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| FrameError::MalformedPayload(e.to_string()))?;

    let name = value
        .get("command")
        .and_then(|c| c.as_str())
        .ok_or_else(|| FrameError::MalformedPayload("missing \"command\" field".to_string()))?;
    if !COMMAND_NAMES.contains(&name) {
        return Err(FrameError::UnknownCommand(name.to_string()));
    }

    let command: Command =
        serde_json::from_value(value).map_err(|e| FrameError::MalformedPayload(e.to_string()))?;
    Ok(command.into())
}

/// Append one frame to `out`
fn encode_frame(header: &Header, payload: &[u8], out: &mut BytesMut) -> Result<(), FrameError> {
    let header_bytes =
        serde_json::to_vec(header).map_err(|e| FrameError::MalformedHeader(e.to_string()))?;
    if header_bytes.len() > u16::MAX as usize {
        return Err(FrameError::BadHeaderLength(header_bytes.len()));
    }

    out.reserve(HEADER_LEN_PREFIX + header_bytes.len() + payload.len());
    out.put_u16(header_bytes.len() as u16);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    Ok(())
}

/// Encode a response frame
pub fn encode_response(response: &Response) -> Result<Bytes, FrameError> {
    let payload =
        serde_json::to_vec(response).map_err(|e| FrameError::MalformedPayload(e.to_string()))?;
    let header = Header::new(ContentType::ResponseJson, payload.len() as u64);

    let mut out = BytesMut::new();
    encode_frame(&header, &payload, &mut out)?;
    Ok(out.freeze())
}

/// Decode one response frame from the front of `bytes`
///
/// Returns the response and the number of bytes it occupied.
pub fn decode_response(bytes: &[u8], limits: &FrameLimits) -> Result<(Response, usize), FrameError> {
    let header_len = decode_header_len(bytes)?;
    let header = decode_header(&bytes[HEADER_LEN_PREFIX..], header_len, limits)?;
    if header.content_type != ContentType::ResponseJson {
        return Err(FrameError::UnsupportedContentType(format!(
            "expected response/json, got {:?}",
            header.content_type
        )));
    }

    let start = HEADER_LEN_PREFIX + header_len;
    let len = header.content_length as usize;
    if bytes.len() < start + len {
        return Err(FrameError::Incomplete {
            needed: start + len - bytes.len(),
        });
    }

    let response = serde_json::from_slice(&bytes[start..start + len])
        .map_err(|e| FrameError::MalformedPayload(e.to_string()))?;
    Ok((response, start + len))
}

/// Encode a request frame for an action (controller side)
pub fn encode_action(action: &Action) -> Result<Bytes, FrameError> {
    let mut out = BytesMut::new();

    let command = match action {
        Action::PlayFile {
            source: AudioSource::Bytes(bytes),
            level,
            device_id,
        } => {
            let mut header = Header::new(ContentType::AudioBinary, bytes.len() as u64);
            header.level = *level;
            header.device_id = *device_id;
            encode_frame(&header, bytes, &mut out)?;
            return Ok(out.freeze());
        }
        Action::PlayFile {
            source: AudioSource::Path(path),
            level,
            device_id,
        } => Command::Play {
            path: path.clone(),
            level: *level,
            device_id: *device_id,
        },
        Action::StopPlayback => Command::Stop,
        Action::SetDevice { device_id } => Command::SetDevice {
            device_id: *device_id,
        },
        Action::Ping => Command::Ping,
        Action::ListDevices => Command::ListDevices,
    };

    let payload =
        serde_json::to_vec(&command).map_err(|e| FrameError::MalformedPayload(e.to_string()))?;
    let header = Header::new(ContentType::CommandJson, payload.len() as u64);
    encode_frame(&header, &payload, &mut out)?;
    Ok(out.freeze())
}

/// Build a raw `command/json` frame around an arbitrary payload
///
/// Useful for controllers that speak commands this crate does not model.
pub fn encode_raw_command(payload: &[u8]) -> Result<Bytes, FrameError> {
    let header = Header::new(ContentType::CommandJson, payload.len() as u64);
    let mut out = BytesMut::new();
    encode_frame(&header, payload, &mut out)?;
    Ok(out.freeze())
}
