//! Conversation turns

use super::sanitize::sanitize;
use crate::api::{ApiFailure, QueryResponse};
use chrono::{DateTime, Local};
use std::fmt;

/// Identifier of a turn, unique and increasing within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(u64);

impl TurnId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTurn {
    pub id: TurnId,
    pub text: String,
    pub submitted_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTurn {
    pub id: TurnId,
    pub raw_text: String,
    /// Derived from `raw_text` once, at construction
    pub sanitized_text: String,
    pub submitted_at: DateTime<Local>,
    pub outcome: Outcome,
    pub sources_count: Option<u32>,
    pub used_excerpts: Vec<String>,
    pub processing_time_seconds: Option<f64>,
    /// Question as echoed back by the server
    pub question: Option<String>,
}

impl AssistantTurn {
    fn answered(id: TurnId, response: QueryResponse) -> Self {
        let sanitized_text = sanitize(&response.answer);
        Self {
            id,
            raw_text: response.answer,
            sanitized_text,
            submitted_at: Local::now(),
            outcome: Outcome::Success,
            sources_count: Some(response.sources_count),
            used_excerpts: response.chunks_used,
            processing_time_seconds: response.processing_time,
            question: Some(response.question).filter(|q| !q.is_empty()),
        }
    }

    fn failed(id: TurnId, failure: &ApiFailure) -> Self {
        Self {
            id,
            raw_text: failure.message.clone(),
            sanitized_text: sanitize(&failure.message),
            submitted_at: Local::now(),
            outcome: Outcome::Failure,
            sources_count: None,
            used_excerpts: Vec::new(),
            processing_time_seconds: None,
            question: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User(UserTurn),
    Assistant(AssistantTurn),
}

impl Turn {
    pub fn id(&self) -> TurnId {
        match self {
            Turn::User(t) => t.id,
            Turn::Assistant(t) => t.id,
        }
    }

    pub fn role(&self) -> TurnRole {
        match self {
            Turn::User(_) => TurnRole::User,
            Turn::Assistant(_) => TurnRole::Assistant,
        }
    }

    /// Text shown for this turn (the sanitized answer for the assistant)
    pub fn display_text(&self) -> &str {
        match self {
            Turn::User(t) => &t.text,
            Turn::Assistant(t) => &t.sanitized_text,
        }
    }

    pub fn submitted_at(&self) -> DateTime<Local> {
        match self {
            Turn::User(t) => t.submitted_at,
            Turn::Assistant(t) => t.submitted_at,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Turn::User(_) => None,
            Turn::Assistant(t) => Some(t.outcome),
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantTurn> {
        match self {
            Turn::Assistant(t) => Some(t),
            Turn::User(_) => None,
        }
    }
}

/// Ordered, in-memory list of turns. Insertion order is display order.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> TurnId {
        self.next_id += 1;
        TurnId(self.next_id)
    }

    pub(crate) fn push_user(&mut self, text: &str) -> TurnId {
        let id = self.allocate_id();
        self.turns.push(Turn::User(UserTurn {
            id,
            text: text.to_string(),
            submitted_at: Local::now(),
        }));
        id
    }

    pub(crate) fn push_answer(&mut self, response: QueryResponse) -> Option<&AssistantTurn> {
        let id = self.allocate_id();
        self.push_assistant(AssistantTurn::answered(id, response))
    }

    pub(crate) fn push_failure(&mut self, failure: &ApiFailure) -> Option<&AssistantTurn> {
        let id = self.allocate_id();
        self.push_assistant(AssistantTurn::failed(id, failure))
    }

    fn push_assistant(&mut self, turn: AssistantTurn) -> Option<&AssistantTurn> {
        self.turns.push(Turn::Assistant(turn));
        self.turns.last().and_then(Turn::as_assistant)
    }

    /// Drop every turn. Ids keep increasing afterwards.
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns
            .binary_search_by_key(&id, Turn::id)
            .ok()
            .map(|i| &self.turns[i])
    }

    pub fn last_assistant(&self) -> Option<&AssistantTurn> {
        self.turns.iter().rev().find_map(Turn::as_assistant)
    }

    /// The `n`th assistant answer, counting from 1
    pub fn nth_assistant(&self, n: usize) -> Option<&AssistantTurn> {
        if n == 0 {
            return None;
        }
        self.turns.iter().filter_map(Turn::as_assistant).nth(n - 1)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
