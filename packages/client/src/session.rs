//! Client session: one connection to a chat relay over TCP or UDP.

use std::{sync::Arc, time::Duration};

use hiroba_shared::{
    ChatEvent, ChatLine, EventPublisher, Message, TransmissionError, Transport,
    protocol::{normalize_username, sanitize_chat_text},
    transport::parse_socket_addr,
};
use tokio::sync::Mutex;

use crate::{error::ClientError, link::LinkState, tcp::TcpConnection, udp::UdpConnection};

/// Bounded wait for the connection tasks on disconnect.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Session settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Send `PING` at this interval while connected; `None` disables
    pub keepalive: Option<Duration>,
}

enum Connection {
    Tcp(TcpConnection),
    Udp(UdpConnection),
}

impl Connection {
    async fn send(&self, message: &Message) -> Result<(), TransmissionError> {
        match self {
            Self::Tcp(connection) => connection.send(message),
            Self::Udp(connection) => connection.send(message).await,
        }
    }

    async fn close(self) {
        match self {
            Self::Tcp(connection) => connection.close(DISCONNECT_TIMEOUT).await,
            Self::Udp(connection) => connection.close(DISCONNECT_TIMEOUT).await,
        }
    }
}

struct ActiveConnection {
    connection: Connection,
    state: Arc<LinkState>,
}

/// A chat session. Events are published through the [`EventPublisher`].
pub struct ClientSession {
    transport: Transport,
    config: SessionConfig,
    publisher: EventPublisher,
    active: Mutex<Option<ActiveConnection>>,
}

impl ClientSession {
    pub fn new(transport: Transport, publisher: EventPublisher) -> Self {
        Self::with_config(transport, SessionConfig::default(), publisher)
    }

    pub fn with_config(
        transport: Transport,
        config: SessionConfig,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            transport,
            config,
            publisher,
            active: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Connect to `ip:port` and join as `username`.
    ///
    /// Failures are published as an error event and returned.
    pub async fn connect(&self, ip: &str, port: u16, username: &str) -> Result<(), ClientError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.take() {
            if current.state.is_connected() {
                *active = Some(current);
                return Err(ClientError::AlreadyConnected);
            }
            // Leftover of a lost connection
            current.connection.close().await;
        }

        match self.open(ip, port, username).await {
            Ok(opened) => {
                *active = Some(opened);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}:{}: {}", ip, port, e);
                self.publisher.publish(ChatEvent::ErrorOccurred(e.to_string()));
                self.publisher.publish(ChatEvent::StatusChanged(false));
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        ip: &str,
        port: u16,
        username: &str,
    ) -> Result<ActiveConnection, ClientError> {
        let username = normalize_username(username)?;
        let addr = parse_socket_addr(ip, port)?;
        let state = Arc::new(LinkState::new(self.publisher.clone()));
        let keepalive = self.config.keepalive;

        let connection = match self.transport {
            Transport::Tcp => Connection::Tcp(
                TcpConnection::open(addr, &username, state.clone(), keepalive).await?,
            ),
            Transport::Udp => Connection::Udp(
                UdpConnection::open(addr, &username, state.clone(), keepalive).await?,
            ),
        };
        tracing::info!("Session of '{}' open over {}", username, self.transport);

        Ok(ActiveConnection { connection, state })
    }

    /// Leave the room and release the connection. Does nothing when not
    /// connected.
    pub async fn disconnect(&self) {
        let Some(current) = self.active.lock().await.take() else {
            return;
        };

        let was_connected = current.state.mark_closed();
        current.connection.close().await;
        if was_connected {
            tracing::info!("Disconnected");
            self.publisher.publish(ChatEvent::StatusChanged(false));
        }
    }

    pub async fn send_chat(&self, text: &str) -> Result<(), ClientError> {
        let text = sanitize_chat_text(text)?;
        self.send(Message::Chat(text)).await
    }

    pub async fn send_ping(&self) -> Result<(), ClientError> {
        self.send(Message::Ping).await
    }

    /// Recent chat lines received, oldest first.
    pub fn history(&self) -> Vec<ChatLine> {
        self.publisher.history()
    }

    pub async fn is_connected(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| current.state.is_connected())
    }

    /// Send one message; a failure tears the session down like a lost
    /// connection.
    async fn send(&self, message: Message) -> Result<(), ClientError> {
        let mut active = self.active.lock().await;
        let Some(current) = active.as_ref() else {
            return Err(ClientError::NotConnected);
        };

        if !current.state.is_connected() {
            if let Some(lost) = active.take() {
                lost.connection.close().await;
            }
            return Err(ClientError::NotConnected);
        }

        let sent = current.connection.send(&message).await;
        if let Err(e) = sent {
            current.state.mark_lost();
            if let Some(lost) = active.take() {
                lost.connection.close().await;
            }
            return Err(e.into());
        }
        Ok(())
    }
}
