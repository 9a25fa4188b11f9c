//! Wire protocol shared by the TCP and UDP relays.
//!
//! Every message is a short ASCII/UTF-8 text made of a tag and an optional
//! payload:
//!
//! | Tag                  | Direction       | Meaning                 |
//! |----------------------|-----------------|-------------------------|
//! | `JOIN:<username>`    | client → server | join request (UDP only) |
//! | `WELCOME:<roomName>` | server → client | join accepted           |
//! | `CHAT:<text>`        | both            | chat line               |
//! | `PING`               | client → server | liveness probe          |
//! | `PONG`               | server → client | liveness reply          |
//! | `LEAVE`              | client → server | departure (UDP only)    |
//!
//! Over TCP each message is one newline-terminated frame, and the very first
//! frame a client sends is its bare username. Over UDP one datagram carries
//! exactly one message without terminator.

use std::fmt;

use thiserror::Error;

/// Default port for both the TCP and the UDP relay.
pub const DEFAULT_PORT: u16 = 9050;

/// Maximum length of one TCP frame, excluding the newline.
pub const MAX_FRAME_LENGTH: usize = 4096;

/// Receive buffer size for one UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Maximum number of characters in a username.
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Maximum number of bytes of chat text a client may send.
pub const MAX_CHAT_LENGTH: usize = 1000;

const JOIN_PREFIX: &str = "JOIN:";
const WELCOME_PREFIX: &str = "WELCOME:";
const CHAT_PREFIX: &str = "CHAT:";
const PING: &str = "PING";
const PONG: &str = "PONG";
const LEAVE: &str = "LEAVE";

/// Protocol-level failures. They are never reported to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message does not start with any known tag
    #[error("Unrecognized message: '{0}'")]
    UnknownTag(String),

    /// The username is empty, too long or contains control characters
    #[error("Invalid username: '{0}'")]
    InvalidUsername(String),

    /// The chat text does not fit in one message
    #[error("Chat text is too long ({0} bytes)")]
    MessageTooLong(usize),
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Join(String),
    Welcome(String),
    Chat(String),
    Ping,
    Pong,
    Leave,
}

impl Message {
    /// Decode one message.
    ///
    /// Tags are case-sensitive. `JOIN:`, `WELCOME:` and `CHAT:` are matched as
    /// prefixes, `PING`, `PONG` and `LEAVE` must match the whole text.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if let Some(username) = raw.strip_prefix(JOIN_PREFIX) {
            return Ok(Self::Join(username.to_string()));
        }
        if let Some(room_name) = raw.strip_prefix(WELCOME_PREFIX) {
            return Ok(Self::Welcome(room_name.to_string()));
        }
        if let Some(text) = raw.strip_prefix(CHAT_PREFIX) {
            return Ok(Self::Chat(text.to_string()));
        }

        match raw {
            PING => Ok(Self::Ping),
            PONG => Ok(Self::Pong),
            LEAVE => Ok(Self::Leave),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    /// Encode the message without any frame terminator.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(username) => write!(f, "{JOIN_PREFIX}{username}"),
            Self::Welcome(room_name) => write!(f, "{WELCOME_PREFIX}{room_name}"),
            Self::Chat(text) => write!(f, "{CHAT_PREFIX}{text}"),
            Self::Ping => f.write_str(PING),
            Self::Pong => f.write_str(PONG),
            Self::Leave => f.write_str(LEAVE),
        }
    }
}

/// Validate and normalize a username.
///
/// Surrounding whitespace is trimmed. The result must be non-empty, at most
/// [`MAX_USERNAME_LENGTH`] characters and free of control characters.
pub fn normalize_username(raw: &str) -> Result<String, ProtocolError> {
    let username = raw.trim();
    let valid = !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LENGTH
        && !username.chars().any(char::is_control);

    if valid {
        Ok(username.to_string())
    } else {
        Err(ProtocolError::InvalidUsername(raw.to_string()))
    }
}

/// Prepare chat text for sending: line breaks become spaces so the text always
/// fits in a single frame.
pub fn sanitize_chat_text(raw: &str) -> Result<String, ProtocolError> {
    let text: String = raw
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    if text.len() > MAX_CHAT_LENGTH {
        return Err(ProtocolError::MessageTooLong(text.len()));
    }
    Ok(text)
}

/// Body of the announcement broadcast when a user joins.
pub fn joined_announcement(username: &str) -> String {
    format!("Server: {username} joined the room")
}

/// Body of the announcement broadcast when a user leaves.
pub fn left_announcement(username: &str) -> String {
    format!("Server: {username} left the room")
}

/// Body of a relayed chat line.
pub fn chat_line(sender_label: &str, text: &str) -> String {
    format!("{sender_label}: {text}")
}
