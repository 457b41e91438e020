//! TCP server: the reactor and its per-connection state machine

pub mod connection;
pub mod reactor;

pub use connection::{Connection, ConnectionState, Interest};
pub use reactor::{Server, ServerState};
