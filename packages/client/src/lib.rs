//! Hiroba chat client.
//!
//! A [`ClientSession`] joins a chat relay over TCP or UDP, sends chat lines
//! and pings, and publishes everything it receives as events.

pub mod error;
mod link;
pub mod session;
mod tcp;
mod udp;

pub use error::ClientError;
pub use link::LOST_CONNECTION_MESSAGE;
pub use session::{ClientSession, SessionConfig};
