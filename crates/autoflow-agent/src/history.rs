//! Bounded per-instance conversation memory.
//!
//! Each agent instance owns exactly one [`ConversationHistory`].  It is a
//! plain value type with no interior sharing, so two instances can never
//! observe each other's turns.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// One recorded turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Oldest-first ring of conversation turns, capped at `limit` entries.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl ConversationHistory {
    /// Create an empty history keeping at most `limit` turns (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Record a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    /// Record an assistant turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            role,
            content,
            at: Utc::now(),
        });
    }

    /// The most recent `n` turns as LLM messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries
            .iter()
            .skip(skip)
            .map(|e| Message {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no turn has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_limit() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.push_user(format!("m{i}"));
        }
        assert_eq!(history.len(), 3);
        let contents: Vec<String> = history.entries().map(|e| e.content.clone()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut history = ConversationHistory::new(10);
        history.push_user("hi");
        history.push_assistant("hello");
        history.push_user("send mail");

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], Message::assistant("hello"));
        assert_eq!(recent[1], Message::user("send mail"));
        assert_eq!(history.recent(50).len(), 3);
    }

    #[test]
    fn zero_limit_keeps_one() {
        let mut history = ConversationHistory::new(0);
        history.push_user("a");
        history.push_user("b");
        assert_eq!(history.len(), 1);
        history.clear();
        assert!(history.is_empty());
    }
}
