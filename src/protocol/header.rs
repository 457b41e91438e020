//! Frame header
//!
//! The header is a UTF-8 JSON object sitting between the 2-byte length
//! prefix and the payload. It names the payload's content type and length
//! plus optional per-content-type metadata.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Byte order tag carried in every header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running host
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Payload content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Structured command, JSON encoded
    #[serde(rename = "command/json")]
    CommandJson,
    /// Raw audio file bytes to be played
    #[serde(rename = "audio/binary")]
    AudioBinary,
    /// Server response, JSON encoded
    #[serde(rename = "response/json")]
    ResponseJson,
}

impl ContentType {
    /// The only encoding accepted for this content type
    pub fn expected_encoding(&self) -> ContentEncoding {
        match self {
            ContentType::CommandJson | ContentType::ResponseJson => ContentEncoding::Utf8,
            ContentType::AudioBinary => ContentEncoding::Binary,
        }
    }
}

/// Payload content encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "binary")]
    Binary,
}

/// Decoded frame header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Header {
    pub byteorder: ByteOrder,
    pub content_type: ContentType,
    pub content_encoding: ContentEncoding,
    pub content_length: u64,

    /// Target output device for audio payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,

    /// Name of the content carried (e.g. original file name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,

    /// Presentation level in dB for audio payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

impl Header {
    /// Create a header for the given content type with the matching encoding
    pub fn new(content_type: ContentType, content_length: u64) -> Self {
        Self {
            byteorder: ByteOrder::native(),
            content_type,
            content_encoding: content_type.expected_encoding(),
            content_length,
            device_id: None,
            content_name: None,
            level: None,
        }
    }

    /// Check the header for internal consistency
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self.content_type.expected_encoding();
        if self.content_encoding != expected {
            return Err(FrameError::MalformedHeader(format!(
                "content-encoding {:?} does not match content-type {:?}",
                self.content_encoding, self.content_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_field_names() {
        let mut header = Header::new(ContentType::AudioBinary, 12);
        header.byteorder = ByteOrder::Big;
        header.level = Some(-20.0);

        let json: serde_json::Value = serde_json::to_value(&header).unwrap();
        assert_eq!(json["byteorder"], "big");
        assert_eq!(json["content-type"], "audio/binary");
        assert_eq!(json["content-encoding"], "binary");
        assert_eq!(json["content-length"], 12);
        assert_eq!(json["level"], -20.0);
        assert!(json.get("device-id").is_none());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let raw = br#"{"byteorder":"little","content-type":"command/json","content-encoding":"utf-8"}"#;
        assert!(serde_json::from_slice::<Header>(raw).is_err());
    }

    #[test]
    fn test_negative_length_rejected() {
        let raw = br#"{"byteorder":"little","content-type":"command/json","content-encoding":"utf-8","content-length":-4}"#;
        assert!(serde_json::from_slice::<Header>(raw).is_err());
    }

    #[test]
    fn test_encoding_mismatch() {
        let mut header = Header::new(ContentType::CommandJson, 2);
        assert!(header.validate().is_ok());

        header.content_encoding = ContentEncoding::Binary;
        assert!(matches!(header.validate(), Err(FrameError::MalformedHeader(_))));
    }
}
