//! The room: registry, broadcast fan-out and presentation events.
//!
//! Both relays share this logic. They differ only in the identity type `K`,
//! the link type `L` and the [`MessagePusher`] reaching that link.

use std::{fmt::Debug, hash::Hash, time::Duration};

use async_trait::async_trait;
use hiroba_shared::{
    ChatEvent, ChatLine, EventPublisher, Message, TransmissionError,
    protocol::{chat_line, joined_announcement, left_announcement},
    time::now_millis,
};

use crate::{
    pusher::MessagePusher,
    registry::{ClientRegistry, Session},
};

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport<K> {
    /// Number of sessions the message was handed to
    pub delivered: usize,
    /// Identities whose transmission failed, removed from the registry
    pub pruned: Vec<K>,
}

/// The single room of a server instance.
pub struct Room<K, L, P> {
    name: String,
    registry: ClientRegistry<K, L>,
    pusher: P,
    publisher: EventPublisher,
}

impl<K, L, P> Room<K, L, P>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    L: Clone + Send + Sync,
    P: MessagePusher<L>,
{
    pub fn new(
        name: impl Into<String>,
        registry: ClientRegistry<K, L>,
        pusher: P,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            pusher,
            publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ClientRegistry<K, L> {
        &self.registry
    }

    /// Send one message to one link, outside any broadcast.
    pub async fn send_to(&self, link: &L, message: &Message) -> Result<(), TransmissionError> {
        self.pusher.push(link, message).await
    }

    /// Register (or re-register) a client after a valid join.
    pub async fn admit(&self, id: K, username: &str, link: L) -> Session<L> {
        let session = self.registry.upsert(id.clone(), username.to_string(), link).await;
        tracing::info!("User '{}' joined the room as {:?}", username, id);
        self.publish_count().await;
        session
    }

    pub async fn announce_joined(&self, username: &str) -> BroadcastReport<K> {
        self.broadcast(&joined_announcement(username)).await
    }

    /// Remove a registered client on request; no-op for unknown identities.
    pub async fn leave(&self, id: &K) -> Option<Session<L>> {
        let session = self.registry.remove(id).await?;
        tracing::info!("User '{}' left the room", session.username);
        self.publish_count().await;
        self.broadcast(&left_announcement(&session.username)).await;
        Some(session)
    }

    /// Tear down a connection that is known to have joined as `username`.
    ///
    /// The departure is announced even when a failed broadcast already pruned
    /// the identity, so every closed connection is announced exactly once.
    pub async fn close_connection(&self, id: &K, username: &str) {
        if self.registry.remove(id).await.is_some() {
            self.publish_count().await;
        }
        tracing::info!("User '{}' left the room", username);
        self.broadcast(&left_announcement(username)).await;
    }

    /// Relay a chat line sent by `sender_label`.
    pub async fn relay_chat(&self, sender_label: &str, text: &str) -> BroadcastReport<K> {
        self.broadcast(&chat_line(sender_label, text)).await
    }

    /// Send `CHAT:<body>` to every registered session.
    ///
    /// Sessions whose transmission fails are removed in one batch after the
    /// pass. The registry lock is not held while sending.
    pub async fn broadcast(&self, body: &str) -> BroadcastReport<K> {
        self.publisher
            .publish(ChatEvent::ChatReceived(ChatLine::from_relayed(body, now_millis())));

        let message = Message::Chat(body.to_string());
        let targets = self.registry.snapshot().await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, session) in targets {
            match self.pusher.push(&session.link, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to send to '{}' ({:?}), dropping it: {}",
                        session.username,
                        id,
                        e
                    );
                    failed.push(id);
                }
            }
        }

        let pruned: Vec<K> = if failed.is_empty() {
            Vec::new()
        } else {
            let removed = self.registry.remove_all(&failed).await;
            self.publish_count().await;
            removed.into_iter().map(|(id, _)| id).collect()
        };

        tracing::debug!(
            "Broadcast '{}' to {} session(s), pruned {}",
            body,
            delivered,
            pruned.len()
        );
        BroadcastReport { delivered, pruned }
    }

    /// Evict sessions silent for longer than `max_idle`, announcing each.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = self.registry.evict_idle(max_idle).await;
        if evicted.is_empty() {
            return 0;
        }

        self.publish_count().await;
        for (id, session) in &evicted {
            tracing::info!(
                "User '{}' ({:?}) timed out after {:?} of silence",
                session.username,
                id,
                max_idle
            );
            self.broadcast(&left_announcement(&session.username)).await;
        }
        evicted.len()
    }

    /// Forget every session; used when the server stops.
    pub async fn clear(&self) {
        let dropped = self.registry.clear().await;
        if dropped > 0 {
            tracing::debug!("Dropped {} session(s) on shutdown", dropped);
        }
        self.publisher.publish(ChatEvent::ClientCountChanged(0));
    }

    async fn publish_count(&self) {
        let count = self.registry.count().await;
        self.publisher.publish(ChatEvent::ClientCountChanged(count));
    }
}

/// Transport-independent control surface of a running room.
#[async_trait]
pub trait RoomControl: Send + Sync {
    fn room_name(&self) -> &str;

    /// Broadcast a line attributed to the server itself.
    async fn announce_from_server(&self, text: &str) -> usize;

    async fn client_count(&self) -> usize;

    async fn shut_down(&self);
}

#[async_trait]
impl<K, L, P> RoomControl for Room<K, L, P>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    L: Clone + Send + Sync,
    P: MessagePusher<L>,
{
    fn room_name(&self) -> &str {
        self.name()
    }

    async fn announce_from_server(&self, text: &str) -> usize {
        self.relay_chat("Server", text).await.delivered
    }

    async fn client_count(&self) -> usize {
        self.registry.count().await
    }

    async fn shut_down(&self) {
        self.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use hiroba_shared::{EventListener, MainThreadQueue};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - Room::broadcast のファンアウトと失敗したセッションの一括削除
    // - 入室・退室・タイムアウトのアナウンス
    // - 表示スレッド向けイベントの発行
    //
    // 【どのようなシナリオをテストするか】
    // 1. 全員への配信成功
    // 2. 一部の送信失敗（失敗したセッションのみ削除）
    // 3. 未登録 ID の leave（何も起こらない）
    // 4. 既に削除済みの接続のクローズでもアナウンスは一度だけ
    // ========================================

    // Fake MessagePusher recording every push and failing for chosen links
    #[derive(Default)]
    struct FakePusher {
        failing: HashSet<u32>,
        sent: Mutex<Vec<(u32, String)>>,
    }

    impl FakePusher {
        fn failing(links: &[u32]) -> Self {
            Self {
                failing: links.iter().copied().collect(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(u32, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagePusher<u32> for FakePusher {
        async fn push(&self, link: &u32, message: &Message) -> Result<(), TransmissionError> {
            if self.failing.contains(link) {
                return Err(TransmissionError::LinkClosed);
            }
            self.sent.lock().unwrap().push((*link, message.encode()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingListener(Mutex<Vec<ChatEvent>>);

    impl EventListener for RecordingListener {
        fn on_event(&self, event: ChatEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        room: Room<u32, u32, FakePusher>,
        queue: Arc<MainThreadQueue>,
        listener: Arc<RecordingListener>,
    }

    impl Fixture {
        fn new(pusher: FakePusher) -> Self {
            let queue = Arc::new(MainThreadQueue::new());
            let listener = Arc::new(RecordingListener::default());
            let publisher = EventPublisher::new(queue.clone(), listener.clone());
            let room = Room::new("Lobby", ClientRegistry::new(), pusher, publisher);
            Self {
                room,
                queue,
                listener,
            }
        }

        fn drained_events(&self) -> Vec<ChatEvent> {
            self.queue.drain_and_run_all();
            self.listener.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_every_session() {
        // テスト項目: 登録済みの全セッションに CHAT が配信される
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "charlie")] {
            fixture.room.registry().upsert(id, name.to_string(), id).await;
        }

        // when (操作):
        let report = fixture.room.relay_chat("alice", "hi").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 3);
        assert!(report.pruned.is_empty());
        let mut receivers: Vec<u32> = fixture.room.pusher.sent().iter().map(|(l, _)| *l).collect();
        receivers.sort();
        assert_eq!(receivers, vec![1, 2, 3]);
        assert!(
            fixture
                .room
                .pusher
                .sent()
                .iter()
                .all(|(_, m)| m == "CHAT:alice: hi")
        );
    }

    #[tokio::test]
    async fn test_broadcast_prunes_exactly_the_failed_sessions() {
        // テスト項目: 送信に失敗したセッションだけがレジストリから削除される
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::failing(&[2, 4]));
        for id in 1..=4 {
            fixture.room.registry().upsert(id, format!("user{id}"), id).await;
        }

        // when (操作):
        let report = fixture.room.relay_chat("user1", "hello").await;

        // then (期待する結果):
        assert_eq!(report.delivered, 2);
        let mut pruned = report.pruned.clone();
        pruned.sort();
        assert_eq!(pruned, vec![2, 4]);
        assert_eq!(fixture.room.registry().count().await, 2);
        assert!(fixture.room.registry().username(&1).await.is_some());
        assert!(fixture.room.registry().username(&3).await.is_some());
        assert!(
            fixture
                .drained_events()
                .contains(&ChatEvent::ClientCountChanged(2))
        );
    }

    #[tokio::test]
    async fn test_broadcast_publishes_chat_line() {
        // テスト項目: ブロードキャストした行が表示用イベントとして発行される
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());

        // when (操作):
        fixture.room.relay_chat("alice", "hi").await;

        // then (期待する結果):
        let events = fixture.drained_events();
        assert!(matches!(
            events.as_slice(),
            [ChatEvent::ChatReceived(line)] if line.text() == "alice: hi"
        ));
    }

    #[tokio::test]
    async fn test_admit_and_announce_joined() {
        // テスト項目: 入室で登録・人数イベント・入室アナウンスが行われる
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());

        // when (操作):
        fixture.room.admit(1, "alice", 1).await;
        fixture.room.announce_joined("alice").await;

        // then (期待する結果):
        assert_eq!(fixture.room.registry().count().await, 1);
        assert_eq!(
            fixture.room.pusher.sent(),
            vec![(1, "CHAT:Server: alice joined the room".to_string())]
        );
        let events = fixture.drained_events();
        assert_eq!(events[0], ChatEvent::ClientCountChanged(1));
    }

    #[tokio::test]
    async fn test_leave_unregistered_identity_is_noop() {
        // テスト項目: 未登録 ID の退室は何もブロードキャストしない
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());
        fixture.room.registry().upsert(1, "alice".to_string(), 1).await;

        // when (操作):
        let result = fixture.room.leave(&99).await;

        // then (期待する結果):
        assert!(result.is_none());
        assert!(fixture.room.pusher.sent().is_empty());
        assert_eq!(fixture.room.registry().count().await, 1);
    }

    #[tokio::test]
    async fn test_leave_announces_departure_to_remaining() {
        // テスト項目: 退室で残りのメンバーに退室アナウンスが届く
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());
        fixture.room.registry().upsert(1, "alice".to_string(), 1).await;
        fixture.room.registry().upsert(2, "bob".to_string(), 2).await;

        // when (操作):
        let result = fixture.room.leave(&1).await;

        // then (期待する結果):
        assert_eq!(result.map(|s| s.username), Some("alice".to_string()));
        assert_eq!(
            fixture.room.pusher.sent(),
            vec![(2, "CHAT:Server: alice left the room".to_string())]
        );
    }

    #[tokio::test]
    async fn test_close_connection_announces_once_even_if_already_pruned() {
        // テスト項目: 既にプルーニングされた接続のクローズでも退室アナウンスは一度だけ
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());
        fixture.room.registry().upsert(2, "bob".to_string(), 2).await;

        // when (操作):
        fixture.room.close_connection(&1, "alice").await;

        // then (期待する結果):
        let departures: Vec<_> = fixture
            .room
            .pusher
            .sent()
            .into_iter()
            .filter(|(_, m)| m == "CHAT:Server: alice left the room")
            .collect();
        assert_eq!(departures.len(), 1);
        assert_eq!(fixture.room.registry().count().await, 1);
    }

    #[tokio::test]
    async fn test_announce_from_server_uses_server_label() {
        // テスト項目: サーバー発言は "Server: " ラベル付きで配信される
        // given (前提条件):
        let fixture = Fixture::new(FakePusher::default());
        fixture.room.registry().upsert(1, "alice".to_string(), 1).await;

        // when (操作):
        let delivered = fixture.room.announce_from_server("maintenance soon").await;

        // then (期待する結果):
        assert_eq!(delivered, 1);
        assert_eq!(
            fixture.room.pusher.sent(),
            vec![(1, "CHAT:Server: maintenance soon".to_string())]
        );
    }
}
