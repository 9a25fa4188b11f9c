//! Shared building blocks of the Hiroba chat relay.
//!
//! The wire protocol, the event queue bridging network tasks and the
//! presentation thread, and the ambient utilities (time, logging, console
//! rendering) used by both the server and the client.

pub mod console;
pub mod error;
pub mod event;
pub mod history;
pub mod logger;
pub mod protocol;
pub mod queue;
pub mod ticker;
pub mod time;
pub mod transport;

pub use error::{TransmissionError, TransportSetupError};
pub use event::{ChatEvent, EventListener};
pub use history::{ChatHistory, ChatLine};
pub use protocol::{Message, ProtocolError};
pub use queue::{EventPublisher, MainThreadQueue};
pub use transport::Transport;
