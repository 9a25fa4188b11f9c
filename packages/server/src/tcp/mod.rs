//! TCP relay: one handler task per accepted connection.

mod handler;
mod server;

pub use handler::{CloseReason, ConnectionId, TcpRoom, handle_connection};
pub use server::start;
