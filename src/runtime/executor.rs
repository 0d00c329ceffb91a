//! Dialog runtime executor

use super::traits::{ChatTransport, Incoming, IncomingKind, RecordStore};
use super::SessionTable;
use crate::state_machine::{transition, Decision, DialogContext, Effect, Event};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause before polling again after a transport error without `retry_after`
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Generic dialog runtime that can work with any record store and transport
///
/// Events are handled strictly one at a time: an event, every effect it
/// produces and every store answer those effects generate are finished
/// before the next inbound event is looked at.
pub struct DialogRuntime<S, T>
where
    S: RecordStore,
    T: ChatTransport,
{
    sessions: SessionTable,
    store: S,
    transport: T,
    shutdown: CancellationToken,
}

impl<S, T> DialogRuntime<S, T>
where
    S: RecordStore,
    T: ChatTransport,
{
    pub fn new(store: S, transport: T, shutdown: CancellationToken) -> Self {
        Self {
            sessions: SessionTable::new(),
            store,
            transport,
            shutdown,
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Poll the transport until `shutdown` is cancelled
    pub async fn run(self) {
        tracing::info!("Starting dialog runtime");

        loop {
            let batch = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                batch = self.transport.next_events() => batch,
            };

            match batch {
                // The batch is already confirmed to the transport; finish it
                // before looking at the shutdown token again
                Ok(events) => {
                    for incoming in events {
                        self.handle_incoming(incoming).await;
                    }
                }
                Err(e) => {
                    let delay = e.retry_after.unwrap_or(POLL_ERROR_BACKOFF);
                    if e.retryable {
                        tracing::warn!(
                            error = %e,
                            delay_ms = %delay.as_millis(),
                            "Polling for updates failed, backing off"
                        );
                    } else {
                        tracing::error!(
                            error = %e,
                            delay_ms = %delay.as_millis(),
                            "Polling for updates rejected, retrying after back-off"
                        );
                    }
                    tokio::select! {
                        biased;

                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let active_dialogs = self.sessions.active().await;
        tracing::info!(
            active_dialogs,
            "Dialog runtime stopped, unfinished dialogs dropped"
        );
    }

    /// Handle one inbound event to completion
    pub async fn handle_incoming(&self, incoming: Incoming) {
        let context = DialogContext::new(incoming.user_id, incoming.chat_id);
        let event = match incoming.kind {
            IncomingKind::Text(text) => Event::from_text(text),
            IncomingKind::Choice {
                token,
                callback_id,
                message,
            } => Event::Choice {
                decision: Decision::from_token(&token),
                callback_id,
                message,
            },
        };
        self.process_event(&context, event).await;
    }

    async fn process_event(&self, context: &DialogContext, event: Event) {
        let mut state = self.sessions.get(context.user_id).await;

        // Store answers are queued behind the effects that produced them
        let mut events = VecDeque::from([event]);

        while let Some(current_event) = events.pop_front() {
            let event_kind = current_event.kind();

            // Pure state transition
            let result = match transition(&state, context, current_event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(
                        user_id = context.user_id,
                        phase = state.phase(),
                        error = %e,
                        "Event ignored"
                    );
                    continue;
                }
            };

            if result.new_state.phase() != state.phase() {
                tracing::info!(
                    user_id = context.user_id,
                    from = state.phase(),
                    to = result.new_state.phase(),
                    event = event_kind,
                    "Dialog transition"
                );
            }
            state = result.new_state;

            // Execute effects and collect generated events
            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(context, effect).await {
                    events.push_back(generated_event);
                }
            }
        }

        self.sessions.store(context.user_id, state).await;
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&self, context: &DialogContext, effect: Effect) -> Option<Event> {
        if effect.touches_store() {
            tracing::debug!(user_id = context.user_id, ?effect, "Executing store effect");
        }

        match effect {
            Effect::Send(message) => {
                if let Err(e) = self.transport.send(context.chat_id, &message).await {
                    tracing::warn!(chat_id = context.chat_id, error = %e, "Failed to send message");
                }
                None
            }

            Effect::AcknowledgeChoice { callback_id } => {
                if let Err(e) = self.transport.acknowledge(&callback_id).await {
                    tracing::warn!(
                        callback_id = %callback_id,
                        error = %e,
                        "Failed to acknowledge choice"
                    );
                }
                None
            }

            Effect::ClearChoices { message } => {
                if let Err(e) = self.transport.clear_choices(&message).await {
                    tracing::warn!(
                        chat_id = message.chat_id,
                        message_id = message.message_id,
                        error = %e,
                        "Failed to clear inline keyboard"
                    );
                }
                None
            }

            Effect::SaveRecord { record } => match self.store.upsert(&record).await {
                Ok(()) => {
                    tracing::info!(user_id = record.user_id, "Student record saved");
                    Some(Event::RecordSaved)
                }
                Err(e) => {
                    tracing::error!(
                        user_id = record.user_id,
                        error = %e,
                        "Failed to save student record"
                    );
                    Some(Event::RecordSaveFailed { message: e })
                }
            },

            Effect::LoadRecord => match self.store.fetch(context.user_id).await {
                Ok(record) => Some(Event::ProfileLoaded { record }),
                Err(e) => {
                    tracing::error!(
                        user_id = context.user_id,
                        error = %e,
                        "Failed to load student record"
                    );
                    Some(Event::ProfileLoadFailed { message: e })
                }
            },

            Effect::DeleteRecord => match self.store.delete(context.user_id).await {
                Ok(()) => {
                    tracing::info!(user_id = context.user_id, "Student record deleted");
                    Some(Event::RecordDeleted)
                }
                Err(e) => {
                    tracing::error!(
                        user_id = context.user_id,
                        error = %e,
                        "Failed to delete student record"
                    );
                    Some(Event::RecordDeleteFailed { message: e })
                }
            },
        }
    }
}
