//! UDP connection: a connected datagram socket and a receive task.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use hiroba_shared::{
    Message, TransmissionError, TransportSetupError, protocol::MAX_DATAGRAM_SIZE,
};
use tokio::{net::UdpSocket, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::link::{LinkState, keepalive_interval, next_keepalive};

pub(crate) struct UdpConnection {
    socket: Arc<UdpSocket>,
    receiver: JoinHandle<()>,
    cancel: CancellationToken,
    left: bool,
}

impl UdpConnection {
    /// Bind an ephemeral port, connect it to the server and send `JOIN`.
    ///
    /// There is no handshake wait: the join is confirmed by a later
    /// `WELCOME`, if ever.
    pub(crate) async fn open(
        addr: SocketAddr,
        username: &str,
        state: Arc<LinkState>,
        keepalive: Option<Duration>,
    ) -> Result<Self, TransportSetupError> {
        let connect_error = |source| TransportSetupError::Connect {
            addr: addr.to_string(),
            source,
        };
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportSetupError::Bind {
                addr: local.to_string(),
                source,
            })?;
        socket.connect(addr).await.map_err(connect_error)?;
        socket
            .send(Message::Join(username.to_string()).encode().as_bytes())
            .await
            .map_err(connect_error)?;
        tracing::info!("Sent join to {} over UDP", addr);

        state.announce_connected();
        let socket = Arc::new(socket);
        let cancel = CancellationToken::new();
        let receiver = tokio::spawn(receive_loop(
            socket.clone(),
            state,
            keepalive,
            cancel.clone(),
        ));

        Ok(Self {
            socket,
            receiver,
            cancel,
            left: false,
        })
    }

    pub(crate) async fn send(&self, message: &Message) -> Result<(), TransmissionError> {
        self.socket.send(message.encode().as_bytes()).await?;
        Ok(())
    }

    /// Tell the server we leave (best effort) and stop the receive task.
    pub(crate) async fn close(mut self, timeout: Duration) {
        if let Err(e) = self.send(&Message::Leave).await {
            tracing::debug!("Failed to send leave: {}", e);
        }
        self.left = true;

        self.cancel.cancel();
        if tokio::time::timeout(timeout, &mut self.receiver).await.is_err() {
            tracing::warn!("Receive task did not stop within {:?}", timeout);
            self.receiver.abort();
        }
    }
}

impl Drop for UdpConnection {
    /// Dropped without `close`: leave without waiting and stop the receive task.
    fn drop(&mut self) {
        if !self.left {
            if let Err(e) = self.socket.try_send(Message::Leave.encode().as_bytes()) {
                tracing::debug!("Failed to send leave on drop: {}", e);
            }
        }
        self.cancel.cancel();
        self.receiver.abort();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    state: Arc<LinkState>,
    keepalive: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut keepalive = keepalive_interval(keepalive);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv(&mut buf) => match received {
                Ok(len) => state.dispatch(&String::from_utf8_lossy(&buf[..len])),
                Err(e) => {
                    // A connected socket reports the server's port as unreachable here.
                    tracing::debug!("Receive from the server failed: {}", e);
                    state.mark_lost();
                    break;
                }
            },
            _ = next_keepalive(&mut keepalive) => {
                if let Err(e) = socket.send(Message::Ping.encode().as_bytes()).await {
                    tracing::debug!("Keepalive ping failed: {}", e);
                    state.mark_lost();
                    break;
                }
            }
        }
    }
}
