//! State shared between a session and its connection tasks.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use hiroba_shared::{ChatEvent, ChatLine, EventPublisher, Message, time::now_millis};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Message published when the server goes away unexpectedly.
pub const LOST_CONNECTION_MESSAGE: &str = "Lost connection to server";

/// Liveness of one connection, and the publisher its tasks report to.
pub(crate) struct LinkState {
    connected: AtomicBool,
    publisher: EventPublisher,
}

impl LinkState {
    pub(crate) fn new(publisher: EventPublisher) -> Self {
        Self {
            connected: AtomicBool::new(true),
            publisher,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publish that the link is up. Called before any receive task starts.
    pub(crate) fn announce_connected(&self) {
        self.publisher.publish(ChatEvent::StatusChanged(true));
    }

    /// The connection failed underneath us. Only the first report is published.
    pub(crate) fn mark_lost(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::warn!("{}", LOST_CONNECTION_MESSAGE);
            self.publisher
                .publish(ChatEvent::ErrorOccurred(LOST_CONNECTION_MESSAGE.to_string()));
            self.publisher.publish(ChatEvent::StatusChanged(false));
        }
    }

    /// Closed on request; returns whether the link was still up.
    pub(crate) fn mark_closed(&self) -> bool {
        self.connected.swap(false, Ordering::SeqCst)
    }

    /// Publish the event for one message received from the server.
    pub(crate) fn dispatch(&self, raw: &str) {
        match Message::parse(raw) {
            Ok(Message::Welcome(room_name)) => {
                tracing::info!("Joined room '{}'", room_name);
                self.publisher.publish(ChatEvent::RoomJoined(room_name));
            }
            Ok(Message::Chat(payload)) => {
                self.publisher.publish(ChatEvent::ChatReceived(ChatLine::from_relayed(
                    &payload,
                    now_millis(),
                )));
            }
            Ok(Message::Pong) => self.publisher.publish(ChatEvent::PongReceived),
            Ok(other) => tracing::debug!("Ignoring {:?} from the server", other),
            Err(e) => tracing::debug!("Ignoring message from the server: {}", e),
        }
    }
}

/// Interval for keepalive pings; the first ping goes out one period after
/// connecting.
pub(crate) fn keepalive_interval(period: Option<Duration>) -> Option<Interval> {
    period.filter(|p| !p.is_zero()).map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    })
}

/// Completes on the next keepalive tick; never completes without keepalive.
pub(crate) async fn next_keepalive(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use hiroba_shared::{EventListener, MainThreadQueue};

    #[derive(Default)]
    struct RecordingListener(Mutex<Vec<ChatEvent>>);

    impl EventListener for RecordingListener {
        fn on_event(&self, event: ChatEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn create_link_state() -> (LinkState, Arc<MainThreadQueue>, Arc<RecordingListener>) {
        let queue = Arc::new(MainThreadQueue::new());
        let listener = Arc::new(RecordingListener::default());
        let state = LinkState::new(EventPublisher::new(queue.clone(), listener.clone()));
        (state, queue, listener)
    }

    #[test]
    fn test_dispatch_classifies_server_messages() {
        // テスト項目: WELCOME / CHAT / PONG がそれぞれのイベントになり、それ以外は無視される
        // given (前提条件):
        let (state, queue, listener) = create_link_state();

        // when (操作):
        for raw in ["WELCOME:Lobby", "CHAT:alice: hi", "PONG", "PING", "bogus"] {
            state.dispatch(raw);
        }
        queue.drain_and_run_all();

        // then (期待する結果):
        let events = listener.0.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ChatEvent::RoomJoined("Lobby".to_string()));
        assert!(matches!(&events[1], ChatEvent::ChatReceived(line) if line.text() == "alice: hi"));
        assert_eq!(events[2], ChatEvent::PongReceived);
    }

    #[test]
    fn test_mark_lost_publishes_once() {
        // テスト項目: 接続喪失は一度だけ通知される
        // given (前提条件):
        let (state, queue, listener) = create_link_state();

        // when (操作):
        state.mark_lost();
        state.mark_lost();
        queue.drain_and_run_all();

        // then (期待する結果):
        assert!(!state.is_connected());
        assert_eq!(
            *listener.0.lock().unwrap(),
            vec![
                ChatEvent::ErrorOccurred(LOST_CONNECTION_MESSAGE.to_string()),
                ChatEvent::StatusChanged(false),
            ]
        );
    }

    #[test]
    fn test_mark_closed_suppresses_lost_report() {
        // テスト項目: 明示的に閉じた後の接続喪失は通知されない
        // given (前提条件):
        let (state, queue, listener) = create_link_state();

        // when (操作):
        let was_connected = state.mark_closed();
        state.mark_lost();
        queue.drain_and_run_all();

        // then (期待する結果):
        assert!(was_connected);
        assert!(listener.0.lock().unwrap().is_empty());
    }
}
