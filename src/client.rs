//! Controller-side client
//!
//! Speaks the same framing as the host. One request is outstanding at a
//! time unless the caller pipelines explicitly with [`Client::send_raw`]
//! followed by several [`Client::recv`] calls.

use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::audio::DeviceInfo;
use crate::error::{Error, FrameError, Result};
use crate::protocol::{decode_response, encode_action, Action, AudioSource, FrameLimits, Response};

pub struct Client {
    stream: TcpStream,
    read_buf: BytesMut,
    limits: FrameLimits,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            limits: FrameLimits::default(),
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Send one action and wait for its response
    pub async fn send(&mut self, action: &Action) -> Result<Response> {
        let frame = encode_action(action)?;
        self.send_raw(&frame).await?;
        self.recv().await
    }

    /// Write bytes as-is, e.g. several frames at once
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next response frame
    ///
    /// Fails with `UnexpectedEof` if the host closes the connection first.
    pub async fn recv(&mut self) -> Result<Response> {
        loop {
            match decode_response(&self.read_buf, &self.limits) {
                Ok((response, used)) => {
                    self.read_buf.advance(used);
                    return Ok(response);
                }
                Err(FrameError::Incomplete { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "host closed the connection",
                )));
            }
        }
    }

    pub async fn ping(&mut self) -> Result<Response> {
        self.send(&Action::Ping).await
    }

    pub async fn stop(&mut self) -> Result<Response> {
        self.send(&Action::StopPlayback).await
    }

    pub async fn set_device(&mut self, device_id: i64) -> Result<Response> {
        self.send(&Action::SetDevice { device_id }).await
    }

    /// Ask the host to play a file from its own filesystem
    pub async fn play_path(&mut self, path: impl Into<PathBuf>, level: Option<f64>) -> Result<Response> {
        self.send(&Action::PlayFile {
            source: AudioSource::Path(path.into()),
            level,
            device_id: None,
        })
        .await
    }

    /// Upload audio file contents and play them
    pub async fn play_bytes(&mut self, bytes: impl Into<bytes::Bytes>, level: Option<f64>) -> Result<Response> {
        self.send(&Action::PlayFile {
            source: AudioSource::Bytes(bytes.into()),
            level,
            device_id: None,
        })
        .await
    }

    pub async fn list_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        let response = self.send(&Action::ListDevices).await?;
        if !response.is_ok() {
            return Err(Error::Refused(
                response.message.unwrap_or_else(|| "device list unavailable".to_string()),
            ));
        }
        let data = response.data.unwrap_or(serde_json::Value::Array(Vec::new()));
        serde_json::from_value(data).map_err(|e| Error::from(FrameError::MalformedPayload(e.to_string())))
    }
}
