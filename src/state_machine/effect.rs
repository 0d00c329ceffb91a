//! Effects produced by state transitions

use super::event::MessageRef;
use crate::db::StudentRecord;
use crate::messages::OutgoingMessage;

/// Effects to be executed after state transition
///
/// Store effects answer with an event (`RecordSaved`, `ProfileLoaded`, ...)
/// that is fed back into the state machine before the next user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a message to the conversation's chat
    Send(OutgoingMessage),

    /// Acknowledge a pressed inline button
    AcknowledgeChoice { callback_id: String },

    /// Remove the inline keyboard from an earlier message
    ClearChoices { message: MessageRef },

    /// Upsert the confirmed record
    SaveRecord { record: StudentRecord },

    /// Fetch the stored record of the conversation's user
    LoadRecord,

    /// Delete the stored record of the conversation's user
    DeleteRecord,
}

impl Effect {
    pub fn send(message: OutgoingMessage) -> Self {
        Effect::Send(message)
    }

    pub fn acknowledge(callback_id: impl Into<String>) -> Self {
        Effect::AcknowledgeChoice {
            callback_id: callback_id.into(),
        }
    }

    pub fn save(record: StudentRecord) -> Self {
        Effect::SaveRecord { record }
    }

    /// Whether this effect talks to the record store
    pub fn touches_store(&self) -> bool {
        matches!(
            self,
            Effect::SaveRecord { .. } | Effect::LoadRecord | Effect::DeleteRecord
        )
    }
}
