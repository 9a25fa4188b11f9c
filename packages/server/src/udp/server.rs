//! Receive loop and idle sweep of the UDP relay.

use std::{sync::Arc, time::Duration};

use hiroba_shared::{
    EventPublisher, TransportSetupError, protocol::MAX_DATAGRAM_SIZE,
    transport::parse_socket_addr,
};
use tokio::{
    net::UdpSocket,
    time::{Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::handler::{UdpRoom, handle_datagram};
use crate::{
    config::ServerConfig, error::ServerError, pusher::DatagramPusher, registry::ClientRegistry,
    room::Room, server::ServerHandle,
};

/// Bind the datagram socket and spawn the receive loop.
pub async fn start(
    config: &ServerConfig,
    publisher: EventPublisher,
) -> Result<ServerHandle, ServerError> {
    let addr = parse_socket_addr(&config.host, config.port)?;
    let bind_error = |source| TransportSetupError::Bind {
        addr: addr.to_string(),
        source,
    };
    let socket = Arc::new(UdpSocket::bind(addr).await.map_err(bind_error)?);
    let local_addr = socket.local_addr().map_err(bind_error)?;

    let room = Arc::new(Room::new(
        config.room_name.clone(),
        ClientRegistry::new(),
        DatagramPusher::new(socket.clone()),
        publisher,
    ));
    let shutdown = CancellationToken::new();

    tracing::info!(
        "UDP chat server for '{}' listening on {}",
        config.room_name,
        local_addr
    );
    let sweep = config
        .idle_timeout
        .zip(config.sweep_period())
        .map(|(max_idle, period)| IdleSweep::new(max_idle, period));
    let task = tokio::spawn(receive_loop(socket, room.clone(), sweep, shutdown.clone()));

    Ok(ServerHandle::new(
        config.transport,
        local_addr,
        room,
        shutdown,
        task,
    ))
}

/// Periodic eviction of silent peers.
struct IdleSweep {
    max_idle: Duration,
    interval: Interval,
}

impl IdleSweep {
    fn new(max_idle: Duration, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { max_idle, interval }
    }
}

/// Completes on the next sweep tick; never completes when sweeping is off.
async fn next_sweep(sweep: &mut Option<IdleSweep>) -> Duration {
    match sweep {
        Some(sweep) => {
            sweep.interval.tick().await;
            sweep.max_idle
        }
        None => std::future::pending().await,
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    room: Arc<UdpRoom>,
    mut sweep: Option<IdleSweep>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    let outcome = handle_datagram(&room, from, &buf[..len]).await;
                    tracing::debug!("Datagram from {} ({} bytes): {:?}", from, len, outcome);
                }
                Err(e) => {
                    // e.g. ICMP port unreachable reported for an earlier send
                    tracing::warn!("Failed to receive a datagram: {}", e);
                }
            },
            max_idle = next_sweep(&mut sweep) => {
                let evicted = room.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::info!("Evicted {} idle client(s)", evicted);
                }
            }
        }
    }

    tracing::info!("UDP receive loop stopped");
}
