//! Accept loop of the TCP relay.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use hiroba_shared::{EventPublisher, TransportSetupError, transport::parse_socket_addr};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::handler::{TcpRoom, handle_connection};
use crate::{
    config::ServerConfig, error::ServerError, pusher::ChannelPusher, registry::ClientRegistry,
    room::Room, server::ServerHandle,
};

/// Pause after a failed accept, so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long the accept loop waits for its handlers when shutting down.
const HANDLER_JOIN_TIMEOUT: Duration = Duration::from_millis(1500);

/// Bind the listener and spawn the accept loop.
pub async fn start(
    config: &ServerConfig,
    publisher: EventPublisher,
) -> Result<ServerHandle, ServerError> {
    let addr = parse_socket_addr(&config.host, config.port)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportSetupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| TransportSetupError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    let room = Arc::new(Room::new(
        config.room_name.clone(),
        ClientRegistry::new(),
        ChannelPusher,
        publisher,
    ));
    let shutdown = CancellationToken::new();

    tracing::info!(
        "TCP chat server for '{}' listening on {}",
        config.room_name,
        local_addr
    );
    let task = tokio::spawn(accept_loop(listener, room.clone(), shutdown.clone()));

    Ok(ServerHandle::new(
        config.transport,
        local_addr,
        room,
        shutdown,
        task,
    ))
}

async fn accept_loop(listener: TcpListener, room: Arc<TcpRoom>, shutdown: CancellationToken) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("Accepted connection from {}", peer);
                    handlers.spawn(serve(stream, peer, room.clone(), shutdown.clone()));
                }
                Err(e) => {
                    tracing::warn!("Failed to accept a connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = finished {
                    tracing::warn!("Connection handler failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    tracing::info!("Stopped accepting; waiting for {} connection(s)", handlers.len());
    let drained = tokio::time::timeout(HANDLER_JOIN_TIMEOUT, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            "{} connection handler(s) did not stop in time, abandoning them",
            handlers.len()
        );
        handlers.detach_all();
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    room: Arc<TcpRoom>,
    shutdown: CancellationToken,
) {
    let reason = handle_connection(stream, peer, room, shutdown).await;
    tracing::debug!("Handler for {} finished: {:?}", peer, reason);
}
