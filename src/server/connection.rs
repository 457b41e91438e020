//! Per-connection state machine
//!
//! A [`Connection`] owns the read and write buffers for one peer and walks
//! the parse states below as bytes arrive. It performs no I/O itself: the
//! reactor feeds it bytes, hands decoded actions to the dispatcher, queues
//! the response and drains the write buffer as the socket accepts it.
//!
//! ```text
//! AwaitingHeaderLen -> AwaitingHeader -> AwaitingPayload -> HaveRequest -> Responding
//!        ^                                                                     |
//!        +---------------------------------------------------------------------+
//!
//! any parse error -> Closing
//! ```

use bytes::{Buf, BytesMut};
use std::net::SocketAddr;

use crate::error::FrameError;
use crate::protocol::codec::{action_from_payload, decode_header, decode_header_len};
use crate::protocol::{Action, FrameLimits, Header, Response, HEADER_LEN_PREFIX};

/// Initial read buffer capacity
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Parse state of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Waiting for the 2-byte header-length prefix
    AwaitingHeaderLen,
    /// Prefix decoded, waiting for the header bytes
    AwaitingHeader { header_len: usize },
    /// Header decoded, waiting for the payload bytes
    AwaitingPayload { header: Header },
    /// A full request has been decoded and is being dispatched
    HaveRequest,
    /// Response queued, flushing the write buffer
    Responding,
    /// Terminal; the reactor drops the connection
    Closing,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::AwaitingHeaderLen => "AwaitingHeaderLen",
            ConnectionState::AwaitingHeader { .. } => "AwaitingHeader",
            ConnectionState::AwaitingPayload { .. } => "AwaitingPayload",
            ConnectionState::HaveRequest => "HaveRequest",
            ConnectionState::Responding => "Responding",
            ConnectionState::Closing => "Closing",
        }
    }
}

/// Readiness the connection currently cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    /// Waiting on the dispatcher, or closed
    None,
}

/// One accepted peer
pub struct Connection {
    peer: SocketAddr,
    read_buf: BytesMut,
    write_buf: BytesMut,
    state: ConnectionState,
    limits: FrameLimits,
    requests: u64,
    bytes_read: u64,
    bytes_written: u64,
}

impl Connection {
    pub fn new(peer: SocketAddr, limits: FrameLimits) -> Self {
        Self {
            peer,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buf: BytesMut::new(),
            state: ConnectionState::AwaitingHeaderLen,
            limits,
            requests: 0,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Append bytes read from the socket
    pub fn receive(&mut self, data: &[u8]) {
        self.bytes_read += data.len() as u64;
        self.read_buf.extend_from_slice(data);
    }

    /// Advance the parser as far as the buffered bytes allow
    ///
    /// Returns `Ok(Some(action))` once a full request has been decoded, which
    /// moves the connection to `HaveRequest`. `Ok(None)` means more bytes
    /// are needed, or a request is already in flight. Any protocol error
    /// moves the connection to `Closing` and discards buffered input.
    pub fn poll_request(&mut self) -> Result<Option<Action>, FrameError> {
        loop {
            match &self.state {
                ConnectionState::AwaitingHeaderLen => match decode_header_len(&self.read_buf) {
                    Ok(header_len) => {
                        self.read_buf.advance(HEADER_LEN_PREFIX);
                        self.state = ConnectionState::AwaitingHeader { header_len };
                    }
                    Err(e) => return self.stall_or_fail(e),
                },
                ConnectionState::AwaitingHeader { header_len } => {
                    let header_len = *header_len;
                    match decode_header(&self.read_buf, header_len, &self.limits) {
                        Ok(header) => {
                            self.read_buf.advance(header_len);
                            self.state = ConnectionState::AwaitingPayload { header };
                        }
                        Err(e) => return self.stall_or_fail(e),
                    }
                }
                ConnectionState::AwaitingPayload { header } => {
                    let len = header.content_length as usize;
                    if self.read_buf.len() < len {
                        return Ok(None);
                    }
                    let header = header.clone();
                    let payload = self.read_buf.split_to(len).freeze();
                    return match action_from_payload(payload, &header) {
                        Ok(action) => {
                            self.requests += 1;
                            self.state = ConnectionState::HaveRequest;
                            Ok(Some(action))
                        }
                        Err(e) => Err(self.fail(e)),
                    };
                }
                ConnectionState::HaveRequest
                | ConnectionState::Responding
                | ConnectionState::Closing => return Ok(None),
            }
        }
    }

    fn stall_or_fail(&mut self, err: FrameError) -> Result<Option<Action>, FrameError> {
        if err.is_incomplete() {
            Ok(None)
        } else {
            Err(self.fail(err))
        }
    }

    fn fail(&mut self, err: FrameError) -> FrameError {
        self.close();
        err
    }

    /// Queue the response to the request in flight
    pub fn respond(&mut self, response: &Response) -> Result<(), FrameError> {
        let frame = match crate::protocol::encode_response(response) {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e)),
        };
        self.write_buf.extend_from_slice(&frame);
        self.state = ConnectionState::Responding;
        Ok(())
    }

    /// Bytes waiting to be written
    pub fn pending_output(&self) -> &[u8] {
        &self.write_buf
    }

    /// Record that `n` bytes from the front of the write buffer were sent
    ///
    /// Once the buffer is empty the connection goes back to reading.
    pub fn advance_written(&mut self, n: usize) {
        let n = n.min(self.write_buf.len());
        self.write_buf.advance(n);
        self.bytes_written += n as u64;

        if self.write_buf.is_empty() && self.state == ConnectionState::Responding {
            self.state = ConnectionState::AwaitingHeaderLen;
        }
    }

    pub fn interest(&self) -> Interest {
        match self.state {
            ConnectionState::AwaitingHeaderLen
            | ConnectionState::AwaitingHeader { .. }
            | ConnectionState::AwaitingPayload { .. } => Interest::Read,
            ConnectionState::Responding => Interest::Write,
            ConnectionState::HaveRequest | ConnectionState::Closing => Interest::None,
        }
    }

    /// True when sitting between frames with nothing buffered
    pub fn is_idle(&self) -> bool {
        self.state == ConnectionState::AwaitingHeaderLen && self.read_buf.is_empty()
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    /// Enter `Closing`, discarding any partial frame and unsent output
    pub fn close(&mut self) {
        self.state = ConnectionState::Closing;
        self.read_buf.clear();
        self.write_buf.clear();
    }

    pub fn buffered_input(&self) -> usize {
        self.read_buf.len()
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
