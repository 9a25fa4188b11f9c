//! Hiroba chat relay server.
//!
//! Serves one named room over TCP (one handler task per connection) or UDP
//! (a single receive loop). Joined clients are kept in a [`ClientRegistry`],
//! and every chat line is broadcast to all of them.

pub mod config;
pub mod error;
pub mod pusher;
pub mod registry;
pub mod room;
pub mod server;
pub mod signal;
pub mod tcp;
pub mod udp;

pub use config::ServerConfig;
pub use error::ServerError;
pub use registry::{ClientRegistry, Session};
pub use room::{BroadcastReport, Room, RoomControl};
pub use server::{ChatServer, ServerHandle};
