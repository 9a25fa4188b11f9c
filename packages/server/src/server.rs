//! Server lifecycle: the running instance handle and the [`ChatServer`] facade.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use hiroba_shared::{ChatEvent, ChatLine, EventPublisher, Transport, protocol::sanitize_chat_text};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, error::ServerError, room::RoomControl, tcp, udp};

/// Bounded wait for the server loop when stopping.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running server instance: its loop task and room.
pub struct ServerHandle {
    transport: Transport,
    local_addr: SocketAddr,
    room: Arc<dyn RoomControl>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn new(
        transport: Transport,
        local_addr: SocketAddr,
        room: Arc<dyn RoomControl>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            transport,
            local_addr,
            room,
            shutdown,
            task,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The bound address (with the OS-assigned port when configured with `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn room_name(&self) -> &str {
        self.room.room_name()
    }

    pub async fn client_count(&self) -> usize {
        self.room.client_count().await
    }

    /// Broadcast `Server: <text>`; returns the number of recipients.
    pub async fn send_chat(&self, text: &str) -> usize {
        self.room.announce_from_server(text).await
    }

    /// Cancel the server loop, wait for it and clear the room.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            tracing::warn!(
                "{} server loop did not stop within {:?}, abandoning it",
                self.transport,
                SHUTDOWN_TIMEOUT
            );
            self.task.abort();
        }
        self.room.shut_down().await;
        tracing::info!("{} server on {} stopped", self.transport, self.local_addr);
    }
}

impl Drop for ServerHandle {
    /// Dropped without `stop`: end the server loop so the port is released.
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}

/// Start/stop facade used by the presentation layer.
///
/// At most one server runs per facade. Every state change is published
/// through the [`EventPublisher`].
pub struct ChatServer {
    publisher: EventPublisher,
    running: Mutex<Option<ServerHandle>>,
}

impl ChatServer {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            running: Mutex::new(None),
        }
    }

    /// Bind and start serving according to `config`.
    ///
    /// Returns the bound address. A setup failure is published as an error
    /// event and returned; it never panics.
    pub async fn start_server(&self, config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let started = match config.transport {
            Transport::Tcp => tcp::start(config, self.publisher.clone()).await,
            Transport::Udp => udp::start(config, self.publisher.clone()).await,
        };

        match started {
            Ok(handle) => {
                let local_addr = handle.local_addr();
                *running = Some(handle);
                self.publisher.publish(ChatEvent::StatusChanged(true));
                self.publisher.publish(ChatEvent::ClientCountChanged(0));
                Ok(local_addr)
            }
            Err(e) => {
                tracing::error!("Failed to start the {} server: {}", config.transport, e);
                self.publisher.publish(ChatEvent::ErrorOccurred(e.to_string()));
                self.publisher.publish(ChatEvent::StatusChanged(false));
                Err(e)
            }
        }
    }

    /// Stop the running server. Does nothing when already stopped.
    pub async fn stop_server(&self) {
        let handle = self.running.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            self.publisher.publish(ChatEvent::StatusChanged(false));
        }
    }

    /// Broadcast a line from the server operator as `Server: <text>`.
    pub async fn send_chat(&self, text: &str) -> Result<usize, ServerError> {
        let text = sanitize_chat_text(text)?;
        let running = self.running.lock().await;
        let handle = running.as_ref().ok_or(ServerError::NotRunning)?;
        Ok(handle.send_chat(&text).await)
    }

    /// Number of joined clients; `0` while stopped.
    pub async fn client_count(&self) -> usize {
        match self.running.lock().await.as_ref() {
            Some(handle) => handle.client_count().await,
            None => 0,
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(ServerHandle::local_addr)
    }

    /// Recent lines broadcast by this server, oldest first.
    pub fn history(&self) -> Vec<ChatLine> {
        self.publisher.history()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
