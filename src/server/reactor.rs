//! The reactor
//!
//! One listening socket and one task per accepted connection, all driven by
//! tokio's I/O driver. Run it on a current-thread runtime and every
//! [`Connection`] lives on the reactor thread; the only work that leaves it
//! is the audio dispatch handed to the worker pool.
//!
//! Each connection task waits on exactly the readiness its state needs
//! (readable while parsing, writable while flushing) and then performs a
//! single non-blocking `try_read`/`try_write`.

use futures_util::FutureExt;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::connection::{Connection, Interest};
use crate::config::ServerConfig;
use crate::dispatch::DispatchHandle;
use crate::error::{Error, Result};
use crate::protocol::FrameLimits;

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// How long a shutting-down connection may take to flush its last response
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, not yet bound
    Idle,
    /// Bound; accepting and servicing connections once run
    Listening,
    ShutDown,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    limits: FrameLimits,
    idle_timeout: Option<Duration>,
    read_chunk: usize,
}

pub struct Server {
    address: String,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    dispatcher: DispatchHandle,
    settings: ConnectionSettings,
    state: ServerState,
}

impl Server {
    /// Create an idle server; nothing is bound yet
    pub fn new(config: &ServerConfig, dispatcher: DispatchHandle) -> Self {
        Self {
            address: config.bind_address(),
            listener: None,
            local_addr: None,
            dispatcher,
            settings: ConnectionSettings {
                limits: config.frame_limits(),
                idle_timeout: config.idle_timeout(),
                read_chunk: config.read_chunk_size.max(1),
            },
            state: ServerState::Idle,
        }
    }

    /// Create and bind in one step
    pub async fn bind(config: &ServerConfig, dispatcher: DispatchHandle) -> Result<Self> {
        let mut server = Self::new(config, dispatcher);
        server.listen().await?;
        Ok(server)
    }

    /// Bind the listening socket
    pub async fn listen(&mut self) -> Result<SocketAddr> {
        if self.state != ServerState::Idle {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "server already bound",
            )));
        }

        let addr = tokio::net::lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| Error::Config(format!("cannot resolve {}", self.address)))?;

        let listener = TcpListener::from_std(listen_socket(addr)?)?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Listening on {}", local_addr);

        self.listener = Some(listener);
        self.local_addr = Some(local_addr);
        self.state = ServerState::Listening;
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Accept and service connections until `shutdown` completes
    ///
    /// On shutdown the listener is closed first. Connections idle between
    /// frames close at once; a connection with a request in flight finishes
    /// it and flushes the response before closing.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.listener.take().ok_or_else(|| {
            Error::Io(io::Error::new(io::ErrorKind::NotConnected, "server is not listening"))
        })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        self.spawn_connection(&mut connections, next_id, stream, peer, stop_rx.clone());
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);

        if !connections.is_empty() {
            tracing::info!("Waiting for {} open connections", connections.len());
        }
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Connection task failed: {}", e);
            }
        }

        self.state = ServerState::ShutDown;
        tracing::info!("Server shut down");
        Ok(())
    }

    fn spawn_connection(
        &self,
        connections: &mut JoinSet<()>,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        stop: watch::Receiver<bool>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("[conn {}] set_nodelay failed: {}", id, e);
        }

        let conn = Connection::new(peer, self.settings.limits);
        let dispatcher = self.dispatcher.clone();
        let settings = self.settings;

        connections.spawn(async move {
            let served = AssertUnwindSafe(serve(id, stream, conn, dispatcher, stop, settings))
                .catch_unwind()
                .await;
            if served.is_err() {
                tracing::error!("[conn {}] Task for {} panicked; connection dropped", id, peer);
            }
        });
    }
}

/// Non-blocking listener with SO_REUSEADDR
fn listen_socket(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    Ok(socket.into())
}

async fn serve(
    id: u64,
    stream: TcpStream,
    mut conn: Connection,
    dispatcher: DispatchHandle,
    stop: watch::Receiver<bool>,
    settings: ConnectionSettings,
) {
    let peer = conn.peer();
    tracing::info!("[conn {}] Accepted connection from {}", id, peer);

    match pump(id, &stream, &mut conn, &dispatcher, stop, &settings).await {
        Ok(()) => tracing::info!(
            "[conn {}] Closed {} ({} requests, {} bytes in, {} bytes out)",
            id,
            peer,
            conn.requests(),
            conn.bytes_read(),
            conn.bytes_written()
        ),
        Err(e) => tracing::warn!("[conn {}] Closing {}: {}", id, peer, e),
    }

    if conn.buffered_input() > 0 {
        tracing::debug!("[conn {}] Discarding {} bytes of partial frame", id, conn.buffered_input());
    }
    conn.close();
}

/// Drive one connection until it closes
async fn pump(
    id: u64,
    stream: &TcpStream,
    conn: &mut Connection,
    dispatcher: &DispatchHandle,
    mut stop: watch::Receiver<bool>,
    settings: &ConnectionSettings,
) -> Result<()> {
    let mut scratch = vec![0u8; settings.read_chunk];
    let mut draining = *stop.borrow_and_update();

    loop {
        // Buffered bytes may already hold the next (pipelined) frame; once
        // draining, nothing new is started
        if draining {
            if conn.interest() == Interest::Read {
                if !conn.is_idle() {
                    tracing::debug!("[conn {}] Shutting down mid-frame", id);
                }
                return Ok(());
            }
        } else if let Some(action) = conn.poll_request()? {
            tracing::debug!("[conn {}] {} request", id, action.name());
            let response = dispatcher.dispatch(action).await;
            conn.respond(&response)?;
        }

        match conn.interest() {
            Interest::Read => {
                if draining {
                    return Ok(());
                }

                let ready = tokio::select! {
                    ready = stream.ready(tokio::io::Interest::READABLE) => ready?,
                    _ = stop.changed() => {
                        draining = true;
                        continue;
                    }
                    _ = idle(settings.idle_timeout) => {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "idle timeout").into());
                    }
                };
                if !ready.is_readable() {
                    continue;
                }

                match stream.try_read(&mut scratch) {
                    Ok(0) => return Ok(()),
                    Ok(n) => conn.receive(&scratch[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Interest::Write => {
                let ready = if draining {
                    tokio::time::timeout(DRAIN_TIMEOUT, stream.ready(tokio::io::Interest::WRITABLE))
                        .await
                        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer not reading during shutdown"))??
                } else {
                    tokio::select! {
                        ready = stream.ready(tokio::io::Interest::WRITABLE) => ready?,
                        _ = stop.changed() => {
                            draining = true;
                            continue;
                        }
                    }
                };
                if !ready.is_writable() {
                    continue;
                }

                match stream.try_write(conn.pending_output()) {
                    Ok(n) => conn.advance_written(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Interest::None => return Ok(()),
        }
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
