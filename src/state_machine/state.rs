//! Dialog state types

use crate::db::{StudentRecord, UserId};

/// A fully collected draft, ready to be confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub age: u8,
    pub grade: String,
}

impl Draft {
    /// The record this draft becomes once the user confirms it
    pub fn to_record(&self, user_id: UserId) -> StudentRecord {
        StudentRecord::new(user_id, self.name.clone(), self.age, self.grade.clone())
    }
}

/// Dialog state of one conversation
///
/// Each variant carries exactly the fields collected so far, so a phase can
/// never read a field that has not been entered yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DialogState {
    /// No collection in progress
    #[default]
    Idle,

    /// Waiting for the user's name
    AwaitingName,

    /// Name stored, waiting for the age
    AwaitingAge { name: String },

    /// Name and age stored, waiting for the grade
    AwaitingGrade { name: String, age: u8 },

    /// Summary shown, waiting for the confirm/cancel choice
    AwaitingConfirmation { draft: Draft },

    /// User confirmed; the upsert is in flight and no other event is accepted
    Committing { draft: Draft },
}

impl DialogState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DialogState::Idle)
    }

    /// Whether the state is waiting for typed input from the user
    pub fn is_collecting(&self) -> bool {
        matches!(
            self,
            DialogState::AwaitingName
                | DialogState::AwaitingAge { .. }
                | DialogState::AwaitingGrade { .. }
                | DialogState::AwaitingConfirmation { .. }
        )
    }

    /// Short name for logging
    pub fn phase(&self) -> &'static str {
        match self {
            DialogState::Idle => "idle",
            DialogState::AwaitingName => "awaiting_name",
            DialogState::AwaitingAge { .. } => "awaiting_age",
            DialogState::AwaitingGrade { .. } => "awaiting_grade",
            DialogState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            DialogState::Committing { .. } => "committing",
        }
    }
}

/// Context for one event (who sent it and where replies go)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogContext {
    pub user_id: UserId,
    pub chat_id: i64,
}

impl DialogContext {
    pub fn new(user_id: UserId, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }

    /// Private chat, where the chat id equals the user id
    #[cfg(test)]
    pub fn private(user_id: UserId) -> Self {
        Self::new(user_id, user_id)
    }
}
