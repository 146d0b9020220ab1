use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// Shape of the result an assistant turn produced, kept instead of the rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRef {
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRef>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            result: None,
        }
    }

    pub fn assistant(content: impl Into<String>, result: Option<ResultRef>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            result,
        }
    }
}

/// Append-only transcript for one session.
#[derive(Debug, Default)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Last `window` turns, oldest first.
    pub fn recent(&self, window: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub sql: String,
    pub row_count: usize,
}

/// Most-recent-first log of executed questions, bounded at `capacity`.
#[derive(Debug)]
pub struct QueryHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, question: &str, sql: &str, row_count: usize) {
        self.entries.push_front(HistoryEntry {
            timestamp: Utc::now(),
            question: question.to_string(),
            sql: sql.to_string(),
            row_count,
        });
        self.entries.truncate(self.capacity);
    }

    pub fn latest(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
