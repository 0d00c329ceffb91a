//! Bot API wire types
//!
//! Only the fields the bot reads or writes are modelled; serde ignores the
//! rest of each object.

use crate::messages::{InlineButton, Markup};
use serde::{Deserialize, Serialize};

/// Envelope of every Bot API answer
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    /// Set for bots and for users who picked one
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// Absent when the message is too old to be delivered
    pub message: Option<Message>,
    pub data: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GetUpdatesRequest<'a> {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
pub struct AnswerCallbackQueryRequest<'a> {
    pub callback_query_id: &'a str,
}

/// Omitting `reply_markup` removes the inline keyboard
#[derive(Debug, Serialize)]
pub struct EditMessageReplyMarkupRequest {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
    },
    Remove {
        remove_keyboard: bool,
    },
    Inline {
        inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl ReplyMarkup {
    /// Wire form of a keyboard; `Markup::None` sends no markup at all
    pub fn from_markup(markup: &Markup) -> Option<Self> {
        match markup {
            Markup::None => None,
            Markup::RemoveKeyboard => Some(ReplyMarkup::Remove {
                remove_keyboard: true,
            }),
            Markup::ReplyKeyboard(rows) => Some(ReplyMarkup::Keyboard {
                keyboard: rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|label| KeyboardButton {
                                text: label.clone(),
                            })
                            .collect()
                    })
                    .collect(),
                resize_keyboard: true,
            }),
            Markup::Inline(rows) => Some(ReplyMarkup::Inline {
                inline_keyboard: rows
                    .iter()
                    .map(|row| row.iter().map(InlineKeyboardButton::from).collect())
                    .collect(),
            }),
        }
    }
}

impl From<&InlineButton> for InlineKeyboardButton {
    fn from(button: &InlineButton) -> Self {
        Self {
            text: button.label.clone(),
            callback_data: button.token.clone(),
        }
    }
}
