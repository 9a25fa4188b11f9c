//! Per-connection handler of the TCP relay.
//!
//! A connection goes `AwaitingHandshake → Active → Closed`:
//!
//! - the first frame is the bare username,
//! - once admitted, `CHAT:` frames are broadcast and `PING` is answered,
//! - cleanup (registry removal and departure broadcast) runs exactly once on
//!   every exit path after a successful handshake.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{sink::SinkExt, stream::StreamExt};
use hiroba_shared::{
    Message,
    protocol::{MAX_FRAME_LENGTH, normalize_username},
};
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError},
    sync::CancellationToken,
};
use uuid::Uuid;

use crate::{
    pusher::{ChannelPusher, OutboundChannel},
    room::Room,
};

/// How long cleanup waits for the writer to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Identity of one accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub type TcpRoom = Room<ConnectionId, OutboundChannel, ChannelPusher>;

type FrameReader = FramedRead<OwnedReadHalf, LinesCodec>;
type FrameWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Why a connection handler ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent no valid username before closing
    HandshakeFailed,
    /// End of stream from the peer
    PeerClosed,
    /// Reading from the socket failed
    ReadFailed,
    /// The writer stopped: the peer no longer accepts bytes
    WriterStopped,
    /// The server is shutting down
    Shutdown,
}

/// Serve one accepted connection until it closes.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    room: Arc<TcpRoom>,
    shutdown: CancellationToken,
) -> CloseReason {
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, new_codec());
    let sink = FramedWrite::new(write_half, new_codec());

    let username = tokio::select! {
        _ = shutdown.cancelled() => return CloseReason::Shutdown,
        username = read_username(&mut frames, peer) => match username {
            Some(username) => username,
            None => return CloseReason::HandshakeFailed,
        },
    };

    let id = ConnectionId::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut writer = pusher_loop(rx, sink, peer);
    let mut writer_done = false;

    room.admit(id, &username, tx.clone()).await;
    if let Err(e) = room
        .send_to(&tx, &Message::Welcome(room.name().to_string()))
        .await
    {
        tracing::warn!("Failed to send welcome to '{}': {}", username, e);
    }
    room.announce_joined(&username).await;

    let reason = tokio::select! {
        reason = read_loop(&mut frames, &room, &username, &tx) => reason,
        _ = &mut writer => {
            writer_done = true;
            CloseReason::WriterStopped
        }
        _ = shutdown.cancelled() => CloseReason::Shutdown,
    };
    tracing::info!("Connection of '{}' ({}) closed: {:?}", username, peer, reason);

    room.close_connection(&id, &username).await;

    // The writer ends once every sender is gone, flushing what is queued.
    drop(tx);
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        tracing::debug!("Writer of '{}' did not finish in time, aborting it", username);
        writer.abort();
    }

    reason
}

fn new_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)
}

/// Read the handshake frame. `None` closes the connection unregistered.
async fn read_username(frames: &mut FrameReader, peer: SocketAddr) -> Option<String> {
    let frame = match frames.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            tracing::debug!("Handshake from {} failed: {}", peer, e);
            return None;
        }
        None => {
            tracing::debug!("{} closed before sending a username", peer);
            return None;
        }
    };

    match normalize_username(trim_frame(&frame)) {
        Ok(username) => Some(username),
        Err(e) => {
            tracing::warn!("Rejecting connection from {}: {}", peer, e);
            None
        }
    }
}

async fn read_loop(
    frames: &mut FrameReader,
    room: &TcpRoom,
    username: &str,
    link: &OutboundChannel,
) -> CloseReason {
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!("Dropping oversized frame from '{}'", username);
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::debug!("Read from '{}' failed: {}", username, e);
                return CloseReason::ReadFailed;
            }
        };

        match Message::parse(trim_frame(&frame)) {
            Ok(Message::Chat(text)) => {
                tracing::debug!("'{}' says: {}", username, text);
                room.relay_chat(username, &text).await;
            }
            Ok(Message::Ping) => {
                if room.send_to(link, &Message::Pong).await.is_err() {
                    return CloseReason::WriterStopped;
                }
            }
            Ok(other) => {
                tracing::debug!("Ignoring {:?} from '{}'", other, username);
            }
            Err(e) => {
                tracing::debug!("Ignoring frame from '{}': {}", username, e);
            }
        }
    }

    CloseReason::PeerClosed
}

/// Spawns the task writing queued frames to the socket.
///
/// The task ends when every sender of `rx` is dropped or a write fails.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sink: FrameWriter,
    peer: SocketAddr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                tracing::debug!("Write to {} failed: {}", peer, e);
                return;
            }
        }
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            tracing::debug!("Closing the stream to {} failed: {}", peer, e);
        }
    })
}

fn trim_frame(frame: &str) -> &str {
    frame.strip_suffix('\r').unwrap_or(frame)
}
