//! Runtime for executing dialogs
//!
//! Owns the session table and the effect executor that connects the pure
//! state machine to the chat transport and the record store.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::DialogRuntime;
pub use traits::*;

use crate::db::UserId;
use crate::state_machine::DialogState;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = DialogRuntime<DatabaseStore, TelegramTransport>;

/// Process-wide table of in-flight dialogs, keyed by user identity.
///
/// Lifecycle: an entry exists only while the user's dialog is away from
/// `Idle`; storing an idle state removes the entry. The table lives in
/// memory only and starts empty on every process start, so a restart
/// silently drops every unfinished draft. Callers must not assume a dialog
/// survives a restart or a crash.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<UserId, DialogState>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a user's dialog (`Idle` when none is stored)
    pub async fn get(&self, user_id: UserId) -> DialogState {
        self.sessions
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace a user's state; idle states are not kept
    pub async fn store(&self, user_id: UserId, state: DialogState) {
        let mut sessions = self.sessions.lock().await;
        if state.is_idle() {
            sessions.remove(&user_id);
        } else {
            sessions.insert(user_id, state);
        }
    }

    /// Number of dialogs currently in progress
    pub async fn active(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
