//! Transport selection.

use std::{fmt, net::SocketAddr, str::FromStr};

use crate::error::TransportSetupError;

/// The transport a server or session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(format!("unknown transport '{other}' (expected tcp or udp)")),
        }
    }
}

/// Parse `host:port` into a socket address, reporting a setup error on failure.
pub fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, TransportSetupError> {
    let raw = format!("{host}:{port}");
    raw.parse()
        .map_err(|_| TransportSetupError::InvalidAddress(raw))
}
