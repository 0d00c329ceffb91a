//! Pure state transition function
//!
//! Guards are evaluated in order: commit outcomes, then the commit lock,
//! then store answers, then commands, then button choices, then typed
//! input. Inside each input phase the cancel keyword is checked before any
//! validation.

use super::state::Draft;
use super::{Command, Decision, DialogContext, DialogState, Effect, Event};
use crate::messages::{self, OutgoingMessage};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Accepted ages, inclusive
pub const AGE_RANGE: RangeInclusive<u8> = 5..=100;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: DialogState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: DialogState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A record is being saved, cannot accept {0}")]
    CommitInProgress(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Why an age answer was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AgeError {
    NotANumber,
    OutOfRange,
}

/// Parse an age answer: ASCII digits only, within [`AGE_RANGE`].
/// Digit strings too large for any integer type count as out of range.
pub(crate) fn parse_age(text: &str) -> Result<u8, AgeError> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(AgeError::NotANumber);
    }
    text.parse::<u64>()
        .ok()
        .and_then(|value| u8::try_from(value).ok())
        .filter(|age| AGE_RANGE.contains(age))
        .ok_or(AgeError::OutOfRange)
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
#[allow(clippy::too_many_lines)] // One arm per row of the transition table
pub fn transition(
    state: &DialogState,
    context: &DialogContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Commit protocol
        // ============================================================

        // Committing + RecordSaved -> Idle
        (DialogState::Committing { .. }, Event::RecordSaved) => {
            Ok(prompt(DialogState::Idle, messages::saved()))
        }

        // Committing + RecordSaveFailed -> Idle (failure is terminal, no retry)
        (DialogState::Committing { .. }, Event::RecordSaveFailed { .. }) => {
            Ok(prompt(DialogState::Idle, messages::save_failed()))
        }

        // Nothing else may complete while the upsert is pending
        (DialogState::Committing { .. }, event) => {
            Err(TransitionError::CommitInProgress(event.kind()))
        }

        // ============================================================
        // Record store answers (phase unchanged)
        // ============================================================
        (state, Event::ProfileLoaded { record }) => match record {
            Some(record) => Ok(reply(state, messages::profile(&record))),
            None => Ok(reply(state, messages::no_profile())),
        },

        (state, Event::RecordDeleted) => Ok(reply(state, messages::deleted())),

        (state, Event::ProfileLoadFailed { .. } | Event::RecordDeleteFailed { .. }) => {
            Ok(reply(state, messages::storage_failed()))
        }

        // ============================================================
        // Commands
        // ============================================================

        // Start/Update from any phase -> AwaitingName (old draft silently dropped)
        (_, Event::Command(Command::Start)) => {
            Ok(prompt(DialogState::AwaitingName, messages::ask_name()))
        }

        (_, Event::Command(Command::Update)) => {
            let message = messages::ask_name_for_update();
            Ok(prompt(DialogState::AwaitingName, message))
        }

        // Cancel from any phase -> Idle
        (_, Event::Command(Command::Cancel)) => Ok(cancelled()),

        (state, Event::Command(Command::Help)) => Ok(reply(state, messages::help())),

        (state, Event::Command(Command::Profile)) => {
            Ok(stay(state).with_effect(Effect::LoadRecord))
        }

        (state, Event::Command(Command::Delete)) => {
            Ok(stay(state).with_effect(Effect::DeleteRecord))
        }

        // Unknown command while collecting is just an answer to the prompt
        (state, Event::Command(Command::Unknown(text))) if state.is_collecting() => {
            transition(state, context, Event::Text { text })
        }

        (DialogState::Idle, Event::Command(Command::Unknown(_)) | Event::Text { .. }) => {
            Ok(reply(state, messages::not_understood()))
        }

        // ============================================================
        // Confirmation choice
        // ============================================================

        // AwaitingConfirmation + Confirm -> Committing (single upsert)
        (
            DialogState::AwaitingConfirmation { draft },
            Event::Choice {
                decision: Decision::Confirm,
                callback_id,
                message,
            },
        ) => {
            let committing = DialogState::Committing {
                draft: draft.clone(),
            };
            Ok(TransitionResult::new(committing)
                .with_effect(Effect::acknowledge(callback_id))
                .with_effects(message.map(|message| Effect::ClearChoices { message }))
                .with_effect(Effect::save(draft.to_record(context.user_id))))
        }

        // AwaitingConfirmation + Cancel -> Idle
        (
            DialogState::AwaitingConfirmation { .. },
            Event::Choice {
                decision: Decision::Cancel,
                callback_id,
                message,
            },
        ) => Ok(TransitionResult::new(DialogState::Idle)
            .with_effect(Effect::acknowledge(callback_id))
            .with_effects(message.map(|message| Effect::ClearChoices { message }))
            .with_effect(Effect::send(messages::cancelled()))),

        // Stale or foreign buttons are acknowledged and otherwise ignored
        (state, Event::Choice { callback_id, .. }) => {
            Ok(stay(state).with_effect(Effect::acknowledge(callback_id)))
        }

        // ============================================================
        // Typed input
        // ============================================================
        (_, Event::Text { text })
            if state.is_collecting() && messages::is_cancel_keyword(&text) =>
        {
            Ok(cancelled())
        }

        // AwaitingName + Text -> AwaitingAge
        (DialogState::AwaitingName, Event::Text { text }) => {
            if text.trim().is_empty() {
                return Ok(reply(state, messages::name_required()));
            }
            let next = DialogState::AwaitingAge { name: text };
            Ok(prompt(next, messages::ask_age()))
        }

        // AwaitingAge + Text -> AwaitingGrade, or re-prompt in place
        (DialogState::AwaitingAge { name }, Event::Text { text }) => match parse_age(&text) {
            Ok(age) => {
                let next = DialogState::AwaitingGrade {
                    name: name.clone(),
                    age,
                };
                Ok(prompt(next, messages::ask_grade()))
            }
            Err(AgeError::NotANumber) => Ok(reply(state, messages::age_not_a_number())),
            Err(AgeError::OutOfRange) => Ok(reply(state, messages::age_out_of_range())),
        },

        // AwaitingGrade + Text -> AwaitingConfirmation
        (DialogState::AwaitingGrade { name, age }, Event::Text { text }) => {
            if text.trim().is_empty() {
                return Ok(reply(state, messages::grade_required()));
            }
            let draft = Draft {
                name: name.clone(),
                age: *age,
                grade: text,
            };
            Ok(summary(draft))
        }

        // AwaitingConfirmation + Text -> the text replaces the grade
        (DialogState::AwaitingConfirmation { draft }, Event::Text { text }) => {
            if text.trim().is_empty() {
                return Ok(summary(draft.clone()));
            }
            Ok(summary(Draft {
                grade: text,
                ..draft.clone()
            }))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.phase(),
            event.kind()
        ))),
    }
}

// Helper functions

fn stay(state: &DialogState) -> TransitionResult {
    TransitionResult::new(state.clone())
}

/// Move to `state` and send one message
fn prompt(state: DialogState, message: OutgoingMessage) -> TransitionResult {
    TransitionResult::new(state).with_effect(Effect::send(message))
}

/// Stay put and send one message
fn reply(state: &DialogState, message: OutgoingMessage) -> TransitionResult {
    prompt(state.clone(), message)
}

fn cancelled() -> TransitionResult {
    prompt(DialogState::Idle, messages::cancelled())
}

fn summary(draft: Draft) -> TransitionResult {
    let message = messages::confirm_summary(&draft);
    prompt(DialogState::AwaitingConfirmation { draft }, message)
}
