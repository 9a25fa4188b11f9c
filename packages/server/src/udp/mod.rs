//! UDP relay: a single receive loop dispatching datagrams inline.

mod handler;
mod server;

pub use handler::{DatagramOutcome, UdpRoom, handle_datagram};
pub use server::start;
