//! Datagram dispatch of the UDP relay.
//!
//! Each datagram is handled inline by the receive loop. Peers are identified
//! by their source address.

use std::net::SocketAddr;

use hiroba_shared::{Message, protocol::normalize_username};

use crate::{pusher::DatagramPusher, room::Room};

pub type UdpRoom = Room<SocketAddr, SocketAddr, DatagramPusher>;

/// What handling one datagram did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramOutcome {
    /// A peer joined (or rejoined) and was welcomed
    Joined,
    /// A chat line from a registered peer was broadcast
    Relayed,
    /// A registered peer's ping was answered
    Ponged,
    /// A registered peer left
    Left,
    /// The datagram was ignored
    Dropped,
}

/// Handle one datagram received from `from`.
pub async fn handle_datagram(room: &UdpRoom, from: SocketAddr, payload: &[u8]) -> DatagramOutcome {
    let raw = String::from_utf8_lossy(payload);
    let message = match Message::parse(&raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Ignoring datagram from {}: {}", from, e);
            return DatagramOutcome::Dropped;
        }
    };

    match message {
        Message::Join(raw_username) => {
            let username = match normalize_username(&raw_username) {
                Ok(username) => username,
                Err(e) => {
                    tracing::warn!("Ignoring join from {}: {}", from, e);
                    return DatagramOutcome::Dropped;
                }
            };
            room.admit(from, &username, from).await;
            if let Err(e) = room
                .send_to(&from, &Message::Welcome(room.name().to_string()))
                .await
            {
                tracing::warn!("Failed to welcome '{}' at {}: {}", username, from, e);
            }
            room.announce_joined(&username).await;
            DatagramOutcome::Joined
        }
        Message::Chat(text) => match room.registry().touch(&from).await {
            Some(username) => {
                tracing::debug!("'{}' says: {}", username, text);
                room.relay_chat(&username, &text).await;
                DatagramOutcome::Relayed
            }
            None => {
                tracing::debug!("Dropping chat from unregistered peer {}", from);
                DatagramOutcome::Dropped
            }
        },
        Message::Ping => {
            if room.registry().touch(&from).await.is_none() {
                tracing::debug!("Dropping ping from unregistered peer {}", from);
                return DatagramOutcome::Dropped;
            }
            if let Err(e) = room.send_to(&from, &Message::Pong).await {
                tracing::warn!("Failed to answer ping from {}: {}", from, e);
            }
            DatagramOutcome::Ponged
        }
        Message::Leave => match room.leave(&from).await {
            Some(_) => DatagramOutcome::Left,
            None => DatagramOutcome::Dropped,
        },
        other => {
            tracing::debug!("Ignoring {:?} from {}", other, from);
            DatagramOutcome::Dropped
        }
    }
}
