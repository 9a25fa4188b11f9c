//! TCP connection: a writer task fed by a channel and a receive task.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{sink::SinkExt, stream::StreamExt};
use hiroba_shared::{
    Message, TransmissionError, TransportSetupError, protocol::MAX_FRAME_LENGTH,
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

use crate::link::{LinkState, keepalive_interval, next_keepalive};

pub(crate) struct TcpConnection {
    /// Taken on close so the writer drains and shuts down the write side
    outbound: Option<mpsc::UnboundedSender<String>>,
    writer: JoinHandle<()>,
    receiver: JoinHandle<()>,
    cancel: CancellationToken,
}

impl TcpConnection {
    /// Connect and send the username as the handshake frame.
    pub(crate) async fn open(
        addr: SocketAddr,
        username: &str,
        state: Arc<LinkState>,
        keepalive: Option<Duration>,
    ) -> Result<Self, TransportSetupError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportSetupError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!("Connected to {} over TCP", addr);

        let (read_half, write_half) = stream.into_split();
        let frames = FramedRead::new(read_half, new_codec());
        let mut sink = FramedWrite::new(write_half, new_codec());

        sink.send(username)
            .await
            .map_err(|e| TransportSetupError::Connect {
                addr: addr.to_string(),
                source: codec_error_into_io(e),
            })?;

        // Must precede anything the receive task publishes.
        state.announce_connected();

        let (outbound, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let writer = writer_loop(rx, sink, state.clone());
        let receiver = tokio::spawn(receive_loop(
            frames,
            outbound.clone(),
            state,
            keepalive,
            cancel.clone(),
        ));

        Ok(Self {
            outbound: Some(outbound),
            writer,
            receiver,
            cancel,
        })
    }

    pub(crate) fn send(&self, message: &Message) -> Result<(), TransmissionError> {
        self.outbound
            .as_ref()
            .ok_or(TransmissionError::LinkClosed)?
            .send(message.encode())
            .map_err(|_| TransmissionError::LinkClosed)
    }

    /// Stop the receive task, then let the writer flush and shut down the
    /// write side, which tells the server we left.
    pub(crate) async fn close(mut self, timeout: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(timeout, &mut self.receiver).await.is_err() {
            tracing::warn!("Receive task did not stop within {:?}", timeout);
            self.receiver.abort();
        }

        self.outbound.take();
        if tokio::time::timeout(timeout, &mut self.writer).await.is_err() {
            tracing::warn!("Writer task did not stop within {:?}", timeout);
            self.writer.abort();
        }
    }
}

impl Drop for TcpConnection {
    /// Dropped without `close`: stop both tasks so the socket is released.
    fn drop(&mut self) {
        self.cancel.cancel();
        self.receiver.abort();
        self.writer.abort();
    }
}

fn codec_error_into_io(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidInput, other),
    }
}

fn new_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)
}

fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    state: Arc<LinkState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                tracing::debug!("Write to the server failed: {}", e);
                state.mark_lost();
                return;
            }
        }
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            tracing::debug!("Shutting down the write side failed: {}", e);
        }
    })
}

async fn receive_loop(
    mut frames: FramedRead<OwnedReadHalf, LinesCodec>,
    outbound: mpsc::UnboundedSender<String>,
    state: Arc<LinkState>,
    keepalive: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut keepalive = keepalive_interval(keepalive);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(line)) => state.dispatch(&line),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!("Dropping oversized frame from the server");
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    tracing::debug!("Read from the server failed: {}", e);
                    state.mark_lost();
                    break;
                }
                None => {
                    tracing::debug!("Server closed the connection");
                    state.mark_lost();
                    break;
                }
            },
            _ = next_keepalive(&mut keepalive) => {
                if outbound.send(Message::Ping.encode()).is_err() {
                    state.mark_lost();
                    break;
                }
            }
        }
    }
}
