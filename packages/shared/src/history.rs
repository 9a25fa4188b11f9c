//! Recent chat history kept for display.

use std::collections::VecDeque;

use crate::time::format_clock_time;

/// Number of chat lines kept for display.
pub const HISTORY_CAPACITY: usize = 50;

/// One chat line as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Who the line is attributed to (`alice`, `Server`), empty when unknown
    pub sender_label: String,
    pub body: String,
    /// Unix timestamp (milliseconds) when the line was received
    pub timestamp: i64,
}

impl ChatLine {
    pub fn new(sender_label: impl Into<String>, body: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender_label: sender_label.into(),
            body: body.into(),
            timestamp,
        }
    }

    /// Build a line from a relayed `"<label>: <body>"` payload.
    pub fn from_relayed(payload: &str, timestamp: i64) -> Self {
        match payload.split_once(": ") {
            Some((label, body)) => Self::new(label, body, timestamp),
            None => Self::new("", payload, timestamp),
        }
    }

    /// The line as it travels on the wire: `"<label>: <body>"`.
    pub fn text(&self) -> String {
        if self.sender_label.is_empty() {
            self.body.clone()
        } else {
            format!("{}: {}", self.sender_label, self.body)
        }
    }

    /// The line prefixed with its local receive time: `"[HH:MM:SS] <text>"`.
    pub fn display(&self) -> String {
        format!("[{}] {}", format_clock_time(self.timestamp), self.text())
    }
}

/// Bounded FIFO of recent chat lines, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    lines: VecDeque<ChatLine>,
    capacity: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: ChatLine) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Display text of the whole history, one line per entry.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(ChatLine::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_relayed_splits_label_and_body() {
        // テスト項目: 中継された行が送信者ラベルと本文に分割される
        // given (前提条件):
        let payload = "alice: hi: there";

        // when (操作):
        let line = ChatLine::from_relayed(payload, 0);

        // then (期待する結果):
        assert_eq!(line.sender_label, "alice");
        assert_eq!(line.body, "hi: there");
        assert_eq!(line.text(), payload);
    }

    #[test]
    fn test_from_relayed_without_label() {
        // テスト項目: ラベルのない行は本文のみとして扱われる
        // given (前提条件):
        let payload = "just text";

        // when (操作):
        let line = ChatLine::from_relayed(payload, 0);

        // then (期待する結果):
        assert_eq!(line.sender_label, "");
        assert_eq!(line.text(), "just text");
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        // テスト項目: 容量を超えると古い行から削除される
        // given (前提条件):
        let mut history = ChatHistory::new();

        // when (操作):
        for i in 0..(HISTORY_CAPACITY + 5) {
            history.push(ChatLine::new("alice", format!("message {i}"), 0));
        }

        // then (期待する結果):
        assert_eq!(history.len(), HISTORY_CAPACITY);
        let first = history.lines().next().unwrap();
        assert_eq!(first.body, "message 5");
        let last = history.lines().last().unwrap();
        assert_eq!(last.body, format!("message {}", HISTORY_CAPACITY + 4));
    }

    #[test]
    fn test_history_render_joins_lines() {
        // テスト項目: 履歴が時刻付きで一行ずつ描画される
        // given (前提条件):
        let mut history = ChatHistory::with_capacity(2);
        history.push(ChatLine::new("alice", "hi", 0));
        history.push(ChatLine::new("bob", "yo", 0));

        // when (操作):
        let rendered = history.render();

        // then (期待する結果):
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] alice: hi"));
        assert!(lines[1].ends_with("] bob: yo"));
    }
}
