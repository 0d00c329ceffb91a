//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{Database, StudentRecord, UserId};
use crate::messages::OutgoingMessage;
use crate::state_machine::{Command, MessageRef};
use crate::telegram::types::{ReplyMarkup, Update};
use crate::telegram::{TelegramClient, TelegramError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Persistent student records keyed by user identity
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the user's record
    async fn upsert(&self, record: &StudentRecord) -> Result<(), String>;

    /// Get the user's record, if any
    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentRecord>, String>;

    /// Delete the user's record; deleting a missing record is not an error
    async fn delete(&self, user_id: UserId) -> Result<(), String>;
}

/// What the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingKind {
    /// Typed text (commands included)
    Text(String),
    /// Pressed an inline button
    Choice {
        token: String,
        callback_id: String,
        message: Option<MessageRef>,
    },
}

/// One inbound event tagged with its conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub user_id: UserId,
    pub chat_id: i64,
    pub kind: IncomingKind,
}

/// Transport failure, with the back-off the remote side asked for
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub retry_after: Option<Duration>,
    /// False when polling again cannot help (bad token, bot blocked)
    pub retryable: bool,
}

impl TransportError {
    #[cfg(test)]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
            retryable: true,
        }
    }
}

impl From<TelegramError> for TransportError {
    fn from(e: TelegramError) -> Self {
        Self {
            retryable: e.kind.is_retryable(),
            message: e.message,
            retry_after: e.retry_after,
        }
    }
}

/// Chat transport delivering user events and accepting replies
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Wait for the next batch of inbound events (may be empty)
    async fn next_events(&self) -> Result<Vec<Incoming>, TransportError>;

    /// Send a message to a chat
    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), TransportError>;

    /// Acknowledge a pressed inline button
    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError>;

    /// Remove the inline keyboard from a message
    async fn clear_choices(&self, message: &MessageRef) -> Result<(), TransportError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn upsert(&self, record: &StudentRecord) -> Result<(), String> {
        (**self).upsert(record).await
    }

    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentRecord>, String> {
        (**self).fetch(user_id).await
    }

    async fn delete(&self, user_id: UserId) -> Result<(), String> {
        (**self).delete(user_id).await
    }
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn next_events(&self) -> Result<Vec<Incoming>, TransportError> {
        (**self).next_events().await
    }

    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), TransportError> {
        (**self).send(chat_id, message).await
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        (**self).acknowledge(callback_id).await
    }

    async fn clear_choices(&self, message: &MessageRef) -> Result<(), TransportError> {
        (**self).clear_choices(message).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `RecordStore`
///
/// Each call runs one blocking statement on the blocking pool and is awaited
/// to completion, so the connection lock never outlives the call.
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> crate::db::DbResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| format!("Database task failed: {e}"))?
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RecordStore for DatabaseStore {
    async fn upsert(&self, record: &StudentRecord) -> Result<(), String> {
        let record = record.clone();
        self.blocking(move |db| db.upsert_student(&record)).await
    }

    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentRecord>, String> {
        let stored = self.blocking(move |db| db.get_student(user_id)).await?;
        Ok(stored.map(|s| s.record))
    }

    async fn delete(&self, user_id: UserId) -> Result<(), String> {
        let existed = self.blocking(move |db| db.delete_student(user_id)).await?;
        tracing::debug!(user_id, existed, "Deleted student record");
        Ok(())
    }
}

/// Adapter to use the Telegram Bot API as `ChatTransport`
pub struct TelegramTransport {
    client: TelegramClient,
    /// Own username, used to drop commands meant for other bots in groups
    bot_username: Option<String>,
    /// Next `update_id` to request; everything below it is confirmed
    offset: Mutex<i64>,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient, bot_username: Option<String>) -> Self {
        Self {
            client,
            bot_username,
            offset: Mutex::new(0),
        }
    }
}

/// Map a Bot API update to an inbound event; `None` for updates the bot
/// does not handle (stickers, photos, channel posts, commands addressed to
/// another bot)
pub fn incoming_from_update(update: Update, bot_username: Option<&str>) -> Option<Incoming> {
    if let Some(query) = update.callback_query {
        let message = query.message.as_ref().map(|m| MessageRef {
            chat_id: m.chat.id,
            message_id: m.message_id,
        });
        return Some(Incoming {
            user_id: query.from.id,
            chat_id: query.message.map_or(query.from.id, |m| m.chat.id),
            kind: IncomingKind::Choice {
                token: query.data.unwrap_or_default(),
                callback_id: query.id,
                message,
            },
        });
    }

    let message = update.message?;
    let user = message.from?;
    let text = message.text?;
    if let (Some(target), Some(own)) = (Command::addressee(&text), bot_username) {
        if !target.eq_ignore_ascii_case(own) {
            return None;
        }
    }
    Some(Incoming {
        user_id: user.id,
        chat_id: message.chat.id,
        kind: IncomingKind::Text(text),
    })
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn next_events(&self) -> Result<Vec<Incoming>, TransportError> {
        let mut offset = self.offset.lock().await;
        let updates = self.client.get_updates(*offset).await?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            *offset = (*offset).max(update.update_id + 1);
            let update_id = update.update_id;
            match incoming_from_update(update, self.bot_username.as_deref()) {
                Some(incoming) => events.push(incoming),
                None => tracing::debug!(update_id, "Skipping unsupported update"),
            }
        }
        Ok(events)
    }

    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.client
            .send_message(
                chat_id,
                &message.text,
                ReplyMarkup::from_markup(&message.markup),
            )
            .await?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        self.client.answer_callback_query(callback_id).await?;
        Ok(())
    }

    async fn clear_choices(&self, message: &MessageRef) -> Result<(), TransportError> {
        self.client
            .clear_reply_markup(message.chat_id, message.message_id)
            .await?;
        Ok(())
    }
}
