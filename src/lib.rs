//! # Socket Audio Host
//!
//! Plays audio on this machine at the request of a remote controller that
//! cannot drive the audio hardware itself.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── CONTROLLER ────────────────────────────────┐
//! │   client::Client  ──  [u16 BE len][JSON header][payload]  ──►  TCP         │
//! └────────────────────────────────────────────────────────────────────────────┘
//!                                      │
//!                                      ▼
//! ┌───────────────────────────────── HOST ─────────────────────────────────────┐
//! │  ┌──────────────────────────────────────────────────────────────────────┐  │
//! │  │                 Reactor (server::reactor) - one thread               │  │
//! │  │   accept ─► Connection ─► Connection ─► Connection ...               │  │
//! │  │             read_buf ─► codec ─► Action        Response ─► write_buf │  │
//! │  └───────────────────────────────┬──────────────────────▲───────────────┘  │
//! │                                  │ job                  │ oneshot          │
//! │                                  ▼                      │                  │
//! │  ┌──────────────────────────────────────────────────────────────────────┐  │
//! │  │            Worker pool (dispatch::worker) ─► Dispatcher               │  │
//! │  └───────────────────────────────┬──────────────────────────────────────┘  │
//! │                                  ▼                                          │
//! │  ┌──────────────────────────────────────────────────────────────────────┐  │
//! │  │   AudioBackend: decode (symphonia) ─► level ─► output (cpal / null)  │  │
//! │  └──────────────────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default listen address
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default listen port
    pub const DEFAULT_PORT: u16 = 65432;

    /// Default cap on the JSON header size
    pub const DEFAULT_MAX_HEADER_LEN: usize = 4096;

    /// Default number of audio worker threads
    pub const DEFAULT_WORKERS: usize = 2;

    /// Default number of jobs that may queue for a worker
    pub const DEFAULT_JOB_QUEUE_DEPTH: usize = 64;

    /// Default socket read size per readiness notification
    pub const DEFAULT_READ_CHUNK: usize = 16 * 1024;
}
