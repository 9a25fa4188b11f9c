//! Client registry: the sessions of every joined client.
//!
//! All operations run inside one critical section per registry. Broadcasts
//! take a [`ClientRegistry::snapshot`] and release the lock before any network
//! I/O happens.

use std::{collections::HashMap, hash::Hash, sync::Arc, time::Duration};

use hiroba_shared::time::{Clock, SystemClock};
use tokio::sync::Mutex;

/// Server-side record of one joined client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<L> {
    pub username: String,
    /// Unix timestamp (milliseconds) of the join
    pub joined_at: i64,
    /// Unix timestamp (milliseconds) of the last message received
    pub last_seen: i64,
    /// How to reach the peer (an outbound channel, a datagram address)
    pub link: L,
}

/// Concurrency-safe mapping from peer identity to [`Session`].
///
/// An identity is present iff the peer completed a join and has not left,
/// failed or been evicted since.
pub struct ClientRegistry<K, L> {
    sessions: Mutex<HashMap<K, Session<L>>>,
    clock: Arc<dyn Clock>,
}

impl<K, L> Default for ClientRegistry<K, L> {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl<K, L> ClientRegistry<K, L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl<K, L> ClientRegistry<K, L>
where
    K: Eq + Hash + Clone,
    L: Clone,
{
    /// Insert or replace the session of `id`. A rejoin replaces the session
    /// wholesale.
    pub async fn upsert(&self, id: K, username: String, link: L) -> Session<L> {
        let now = self.clock.now_millis();
        let session = Session {
            username,
            joined_at: now,
            last_seen: now,
            link,
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(id, session.clone());
        session
    }

    /// Refresh `last_seen`; returns the username when `id` is registered.
    pub async fn touch(&self, id: &K) -> Option<String> {
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(id).map(|session| {
            session.last_seen = now;
            session.username.clone()
        })
    }

    pub async fn remove(&self, id: &K) -> Option<Session<L>> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id)
    }

    /// Remove several identities in one critical section.
    pub async fn remove_all(&self, ids: &[K]) -> Vec<(K, Session<L>)> {
        let mut sessions = self.sessions.lock().await;
        ids.iter()
            .filter_map(|id| sessions.remove(id).map(|session| (id.clone(), session)))
            .collect()
    }

    /// Copy of every session, in no particular order.
    pub async fn snapshot(&self) -> Vec<(K, Session<L>)> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect()
    }

    pub async fn count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.len()
    }

    pub async fn username(&self, id: &K) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).map(|session| session.username.clone())
    }

    /// Remove and return every session silent for longer than `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<(K, Session<L>)> {
        let now = self.clock.now_millis();
        let max_idle_millis = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);

        let mut sessions = self.sessions.lock().await;
        let stale: Vec<K> = sessions
            .iter()
            .filter(|(_, session)| now.saturating_sub(session.last_seen) > max_idle_millis)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|session| (id, session)))
            .collect()
    }

    /// Drop every session; returns how many there were.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        count
    }
}
