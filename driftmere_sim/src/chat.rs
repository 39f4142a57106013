// Per-player chat history with dual-bound eviction.
//
// History is bounded two ways: at most `max_len` entries (oldest evicted on
// push) and at most `ttl` seconds of age at read time (evicted by the per-tick
// sweep). Timestamps are game time — the sim's monotonic accumulator — so a
// paused or slowed server never expires chat off wall-clock drift.

use std::collections::VecDeque;

/// One submitted chat message.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatEntry {
    pub text: String,
    /// Game-time seconds at submission.
    pub timestamp: f64,
}

/// Bounded, ordered chat history. Oldest entries sit at the front.
#[derive(Clone, Debug)]
pub struct ChatHistory {
    entries: VecDeque<ChatEntry>,
    max_len: usize,
}

impl ChatHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// Append a message, evicting the oldest entry if the count bound is hit.
    pub fn push(&mut self, text: String, now: f64) {
        if self.entries.len() == self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(ChatEntry {
            text,
            timestamp: now,
        });
    }

    /// Drop every entry older than `ttl` seconds. Called once per tick.
    pub fn evict_expired(&mut self, now: f64, ttl: f64) {
        while let Some(front) = self.entries.front() {
            if now - front.timestamp > ttl {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_order() {
        let mut chat = ChatHistory::new(5);
        chat.push("one".into(), 1.0);
        chat.push("two".into(), 2.0);
        let texts: Vec<&str> = chat.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn count_bound_evicts_oldest() {
        let mut chat = ChatHistory::new(3);
        for i in 0..5 {
            chat.push(format!("msg{i}"), f64::from(i));
        }
        assert_eq!(chat.len(), 3);
        let texts: Vec<&str> = chat.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["msg2", "msg3", "msg4"]);
    }

    #[test]
    fn age_bound_evicts_expired() {
        let mut chat = ChatHistory::new(10);
        chat.push("old".into(), 0.0);
        chat.push("mid".into(), 5.0);
        chat.push("new".into(), 9.5);

        chat.evict_expired(10.0, 8.0); // "old" is 10s old, over the 8s ttl
        let texts: Vec<&str> = chat.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["mid", "new"]);

        chat.evict_expired(14.0, 8.0); // now "mid" is 9s old
        let texts: Vec<&str> = chat.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["new"]);
    }

    #[test]
    fn entry_at_exact_ttl_survives() {
        let mut chat = ChatHistory::new(10);
        chat.push("edge".into(), 0.0);
        chat.evict_expired(8.0, 8.0);
        assert_eq!(chat.len(), 1);
        chat.evict_expired(8.0001, 8.0);
        assert!(chat.is_empty());
    }

    #[test]
    fn both_bounds_hold_together() {
        let mut chat = ChatHistory::new(2);
        chat.push("a".into(), 0.0);
        chat.push("b".into(), 1.0);
        chat.push("c".into(), 2.0); // count bound drops "a"
        chat.evict_expired(9.5, 8.0); // age bound drops "b"
        let texts: Vec<&str> = chat.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["c"]);
    }
}
