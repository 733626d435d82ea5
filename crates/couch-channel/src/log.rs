//! Append-only message log.
//!
//! Only the owning channel appends. Clones share the same entries, so a
//! handle given to the UI always sees what the channel has appended so far.

use std::sync::Arc;

use couch_core::ChatMessage;
use parking_lot::RwLock;

/// Ordered transcript of one session channel.
#[derive(Clone, Debug)]
pub struct MessageLog {
    entries: Arc<RwLock<Vec<ChatMessage>>>,
}

impl MessageLog {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub(crate) fn append(&self, message: ChatMessage) {
        self.entries.write().push(message);
    }

    pub(crate) fn extend(&self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.entries.write().extend(messages);
    }

    /// Every entry in insertion order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.read().clone()
    }

    /// Entries from index `from` onwards.
    pub fn since(&self, from: usize) -> Vec<ChatMessage> {
        self.entries
            .read()
            .get(from..)
            .map(<[ChatMessage]>::to_vec)
            .unwrap_or_default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let log = MessageLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn keeps_insertion_order_and_duplicates() {
        let log = MessageLog::new();
        log.append(ChatMessage::user("a"));
        log.extend([ChatMessage::counterpart("b"), ChatMessage::counterpart("b")]);
        assert_eq!(
            log.snapshot(),
            vec![
                ChatMessage::user("a"),
                ChatMessage::counterpart("b"),
                ChatMessage::counterpart("b"),
            ]
        );
    }

    #[test]
    fn clones_share_entries() {
        let log = MessageLog::new();
        let view = log.clone();
        log.append(ChatMessage::user("x"));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn since_returns_tail() {
        let log = MessageLog::new();
        log.extend([ChatMessage::user("1"), ChatMessage::user("2"), ChatMessage::user("3")]);
        assert_eq!(log.since(1).len(), 2);
        assert_eq!(log.since(1)[0].text(), "2");
        assert!(log.since(3).is_empty());
        assert!(log.since(10).is_empty());
    }
}
