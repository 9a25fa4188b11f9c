//! Message pushers: how a message reaches one session's link.
//!
//! ## Implementations
//!
//! - [`ChannelPusher`]: TCP. Each connection has a writer task fed by an
//!   unbounded channel; pushing enqueues a frame for that task.
//! - [`DatagramPusher`]: UDP. Pushing sends one datagram from the server's
//!   bound socket to the peer's address.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use hiroba_shared::{Message, TransmissionError};
use tokio::{net::UdpSocket, sync::mpsc};

/// Outbound frames of one TCP connection.
///
/// Unbounded: frames for a peer that stops reading accumulate until its
/// connection closes.
pub type OutboundChannel = mpsc::UnboundedSender<String>;

/// Sends a protocol message over a session link of type `L`.
#[async_trait]
pub trait MessagePusher<L>: Send + Sync {
    async fn push(&self, link: &L, message: &Message) -> Result<(), TransmissionError>;
}

/// Pusher for TCP connections.
///
/// A closed channel means the connection's writer has stopped, which is
/// reported as [`TransmissionError::LinkClosed`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelPusher;

#[async_trait]
impl MessagePusher<OutboundChannel> for ChannelPusher {
    async fn push(
        &self,
        link: &OutboundChannel,
        message: &Message,
    ) -> Result<(), TransmissionError> {
        link.send(message.encode())
            .map_err(|_| TransmissionError::LinkClosed)
    }
}

/// Pusher for UDP peers, sharing the server's bound socket.
#[derive(Debug, Clone)]
pub struct DatagramPusher {
    socket: Arc<UdpSocket>,
}

impl DatagramPusher {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl MessagePusher<SocketAddr> for DatagramPusher {
    async fn push(&self, link: &SocketAddr, message: &Message) -> Result<(), TransmissionError> {
        self.socket
            .send_to(message.encode().as_bytes(), link)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_pusher_enqueues_encoded_frame() {
        // テスト項目: チャネルにエンコード済みのフレームが積まれる
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = ChannelPusher.push(&tx, &Message::Pong).await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.recv().await, Some("PONG".to_string()));
    }

    #[tokio::test]
    async fn test_channel_pusher_reports_closed_link() {
        // テスト項目: 書き込みタスクが終了したリンクへの送信はエラーになる
        // given (前提条件):
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);

        // when (操作):
        let result = ChannelPusher.push(&tx, &Message::Pong).await;

        // then (期待する結果):
        assert!(matches!(result, Err(TransmissionError::LinkClosed)));
    }

    #[tokio::test]
    async fn test_datagram_pusher_sends_one_datagram() {
        // テスト項目: ピアのアドレスに 1 つのデータグラムが送信される
        // given (前提条件):
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let pusher = DatagramPusher::new(server);

        // when (操作):
        let result = pusher
            .push(&peer.local_addr().unwrap(), &Message::Welcome("Lobby".to_string()))
            .await;

        // then (期待する結果):
        assert!(result.is_ok());
        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"WELCOME:Lobby");
    }
}
