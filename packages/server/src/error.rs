//! Error types for the chat relay server.

use hiroba_shared::{ProtocolError, TransportSetupError};
use thiserror::Error;

/// Server-specific errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start_server` was called while a server is running
    #[error("Server is already running")]
    AlreadyRunning,

    /// An operation needing a running server was called while stopped
    #[error("Server is not running")]
    NotRunning,

    /// The listening socket could not be set up
    #[error(transparent)]
    TransportSetup(#[from] TransportSetupError),

    /// Server-side chat text was rejected
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
