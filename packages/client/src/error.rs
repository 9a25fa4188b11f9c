//! Error types for the chat client.

use hiroba_shared::{ProtocolError, TransmissionError, TransportSetupError};
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect` was called while a session is connected
    #[error("Already connected")]
    AlreadyConnected,

    /// A send was attempted without a live connection
    #[error("Not connected")]
    NotConnected,

    /// Connecting to the server failed
    #[error(transparent)]
    TransportSetup(#[from] TransportSetupError),

    /// Sending to the server failed; the session has been torn down
    #[error(transparent)]
    Transmission(#[from] TransmissionError),

    /// The username or chat text was rejected before sending
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
