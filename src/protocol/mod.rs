//! Wire protocol: header, request/response values and the frame codec

pub mod codec;
pub mod header;
pub mod message;

pub use codec::{
    decode_header, decode_header_len, decode_payload, decode_response, encode_action,
    encode_response, FrameLimits, HEADER_LEN_PREFIX,
};
pub use header::{ByteOrder, ContentEncoding, ContentType, Header};
pub use message::{Action, AudioSource, Response, ResultCode};
