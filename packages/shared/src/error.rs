//! Transport error types shared by the server and the client.

use std::io;

use thiserror::Error;

/// Setting up a transport failed: bind, connect or address resolution.
///
/// Fatal to the attempted operation only, never to the process.
#[derive(Debug, Error)]
pub enum TransportSetupError {
    /// The address string could not be parsed
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// Binding a listening or datagram socket failed
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// Connecting to the server failed
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
}

/// Sending to or receiving from an established peer failed.
#[derive(Debug, Error)]
pub enum TransmissionError {
    /// The socket reported an I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer's outbound channel is gone (its writer has stopped)
    #[error("Peer link is closed")]
    LinkClosed,
}
