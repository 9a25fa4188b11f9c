//! Terminal rendering of chat events for the CLI binaries.

use std::io::Write;

use crate::{event::ChatEvent, event::EventListener, history::ChatLine};

/// Event formatter for terminal display
pub struct EventFormatter;

impl EventFormatter {
    /// Format a status change
    ///
    /// # Arguments
    ///
    /// * `subject` - What changed state (e.g., "TCP server", "Session")
    /// * `active` - Whether it is now running/connected
    pub fn format_status(subject: &str, active: bool) -> String {
        let state = if active { "online" } else { "offline" };
        format!("* {} is {}\n", subject, state)
    }

    /// Format a room-joined notification
    pub fn format_room_joined(room_name: &str) -> String {
        format!(
            "\n============================================================\n\
             Room: {}\n\
             ============================================================\n",
            room_name
        )
    }

    /// Format a chat line with its receive time
    pub fn format_chat_line(line: &ChatLine) -> String {
        format!("{}\n", line.display())
    }

    /// Format a client count update
    pub fn format_client_count(count: usize) -> String {
        format!("* Connected Clients: {}\n", count)
    }

    /// Format an error notification
    pub fn format_error(message: &str) -> String {
        format!("! {}\n", message)
    }

    /// Format a pong notification
    pub fn format_pong() -> String {
        "* Received pong from server\n".to_string()
    }

    /// Format any event
    pub fn format_event(subject: &str, event: &ChatEvent) -> String {
        match event {
            ChatEvent::StatusChanged(active) => Self::format_status(subject, *active),
            ChatEvent::RoomJoined(room_name) => Self::format_room_joined(room_name),
            ChatEvent::ChatReceived(line) => Self::format_chat_line(line),
            ChatEvent::ClientCountChanged(count) => Self::format_client_count(*count),
            ChatEvent::ErrorOccurred(message) => Self::format_error(message),
            ChatEvent::PongReceived => Self::format_pong(),
        }
    }
}

/// Listener printing every event to stdout, then redisplaying the prompt.
pub struct ConsoleListener {
    subject: String,
    prompt: Option<String>,
}

impl ConsoleListener {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

impl EventListener for ConsoleListener {
    fn on_event(&self, event: ChatEvent) {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "\r{}", EventFormatter::format_event(&self.subject, &event)).ok();
        if let Some(prompt) = &self.prompt {
            write!(stdout, "{}", prompt).ok();
        }
        stdout.flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_status() {
        // テスト項目: 状態変化が online / offline で表示される
        // given (前提条件):
        let subject = "TCP server";

        // when (操作):
        let online = EventFormatter::format_status(subject, true);
        let offline = EventFormatter::format_status(subject, false);

        // then (期待する結果):
        assert_eq!(online, "* TCP server is online\n");
        assert_eq!(offline, "* TCP server is offline\n");
    }

    #[test]
    fn test_format_room_joined_contains_room_name() {
        // テスト項目: 入室通知にルーム名が含まれる
        // given (前提条件):
        let room_name = "Lobby";

        // when (操作):
        let result = EventFormatter::format_room_joined(room_name);

        // then (期待する結果):
        assert!(result.contains("Room: Lobby\n"));
    }

    #[test]
    fn test_format_event_dispatches_by_kind() {
        // テスト項目: イベント種別ごとに対応する書式が使われる
        // given (前提条件):
        let line = ChatLine::new("alice", "hi", 0);

        // when (操作):
        let chat = EventFormatter::format_event("Session", &ChatEvent::ChatReceived(line));
        let count = EventFormatter::format_event("Session", &ChatEvent::ClientCountChanged(3));
        let error = EventFormatter::format_event(
            "Session",
            &ChatEvent::ErrorOccurred("Lost connection to server".to_string()),
        );

        // then (期待する結果):
        assert!(chat.ends_with("] alice: hi\n"));
        assert_eq!(count, "* Connected Clients: 3\n");
        assert_eq!(error, "! Lost connection to server\n");
        assert_eq!(
            EventFormatter::format_event("Session", &ChatEvent::PongReceived),
            "* Received pong from server\n"
        );
    }
}
