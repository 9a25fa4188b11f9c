//! Events the core emits towards the presentation layer.

use crate::history::ChatLine;

/// A notification for the presentation layer.
///
/// Events are never delivered directly from a network task: they always go
/// through the [`MainThreadQueue`](crate::queue::MainThreadQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The server is running / the session is connected (or no longer)
    StatusChanged(bool),
    /// The server accepted our join; carries the room name
    RoomJoined(String),
    /// A chat line arrived (or, on the server, was broadcast)
    ChatReceived(ChatLine),
    /// Number of joined clients on the server
    ClientCountChanged(usize),
    /// A setup or transmission failure worth showing to the user
    ErrorOccurred(String),
    /// The server answered a `PING`
    PongReceived,
}

/// Consumer of [`ChatEvent`]s, implemented by the presentation layer.
///
/// Called only from the thread draining the event queue.
#[cfg_attr(test, mockall::automock)]
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: ChatEvent);
}

/// Listener that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EventListener for NoopListener {
    fn on_event(&self, _event: ChatEvent) {}
}
