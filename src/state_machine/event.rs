//! Events that can occur in a dialog

use crate::db::StudentRecord;
use crate::messages::{CANCEL_TOKEN, CONFIRM_TOKEN};

/// A bot command typed by the user (`/start`, `/help@my_bot`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Update,
    Profile,
    Delete,
    Help,
    Cancel,
    /// Any other slash-prefixed text, kept verbatim
    Unknown(String),
}

impl Command {
    /// Parse a command from message text. Returns `None` for plain text.
    ///
    /// The command name is matched case-insensitively and a `@botname`
    /// suffix is ignored; arguments after the first whitespace are dropped.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default().to_lowercase();

        let command = match name.as_str() {
            "start" => Command::Start,
            "update" => Command::Update,
            "profile" => Command::Profile,
            "delete" => Command::Delete,
            "help" => Command::Help,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(text.to_string()),
        };
        Some(command)
    }

    /// Bot username a command is addressed to (`/start@my_bot` → `my_bot`)
    pub fn addressee(text: &str) -> Option<&str> {
        let rest = text.strip_prefix('/')?;
        let word = rest.split_whitespace().next()?;
        word.split_once('@')
            .map(|(_, bot)| bot)
            .filter(|bot| !bot.is_empty())
    }
}

/// Answer carried by a pressed inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Cancel,
    /// Token we never issued (old keyboard, tampered client)
    Other(String),
}

impl Decision {
    pub fn from_token(token: &str) -> Self {
        match token {
            CONFIRM_TOKEN => Decision::Confirm,
            CANCEL_TOKEN => Decision::Cancel,
            other => Decision::Other(other.to_string()),
        }
    }
}

/// Location of a message that carries an inline keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    Command(Command),
    Text {
        text: String,
    },
    Choice {
        decision: Decision,
        /// Must be acknowledged exactly once
        callback_id: String,
        /// Message whose keyboard was pressed, when the transport knows it
        message: Option<MessageRef>,
    },

    // Record store events
    RecordSaved,
    RecordSaveFailed {
        message: String,
    },
    ProfileLoaded {
        record: Option<StudentRecord>,
    },
    ProfileLoadFailed {
        message: String,
    },
    RecordDeleted,
    RecordDeleteFailed {
        message: String,
    },
}

impl Event {
    /// Classify user text as a command or plain input
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match Command::parse(&text) {
            Some(command) => Event::Command(command),
            None => Event::Text { text },
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command(_) => "command",
            Event::Text { .. } => "text",
            Event::Choice { .. } => "choice",
            Event::RecordSaved => "record_saved",
            Event::RecordSaveFailed { .. } => "record_save_failed",
            Event::ProfileLoaded { .. } => "profile_loaded",
            Event::ProfileLoadFailed { .. } => "profile_load_failed",
            Event::RecordDeleted => "record_deleted",
            Event::RecordDeleteFailed { .. } => "record_delete_failed",
        }
    }
}
