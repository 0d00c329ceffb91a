//! Outbound messages and keyboards
//!
//! Every text the bot sends lives here, so the state machine only decides
//! *which* message goes out and never formats one itself.

use crate::db::StudentRecord;
use crate::state_machine::state::Draft;

/// Reserved inline cancel keyword, compared case-insensitively
pub const CANCEL_KEYWORD: &str = "Отменить";

/// Callback token of the confirm button on the summary
pub const CONFIRM_TOKEN: &str = "confirm";

/// Callback token of the cancel button on the summary
pub const CANCEL_TOKEN: &str = "cancel";

const CONFIRM_LABEL: &str = "Подтвердить";

/// Grades offered on the grade keyboard
const GRADES: std::ops::RangeInclusive<u8> = 1..=11;
const GRADE_ROW_WIDTH: usize = 4;

/// A button that answers with a callback token instead of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub token: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Keyboard attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Markup {
    /// Leave whatever keyboard the user currently sees
    #[default]
    None,
    /// Hide the reply keyboard
    RemoveKeyboard,
    /// Reply keyboard; pressing a button sends its label as text
    ReplyKeyboard(Vec<Vec<String>>),
    /// Choice widget attached to the message itself
    Inline(Vec<Vec<InlineButton>>),
}

/// A message to deliver to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub markup: Markup,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::None,
        }
    }

    #[must_use]
    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }
}

/// Whether `text` is the reserved cancel keyword
pub fn is_cancel_keyword(text: &str) -> bool {
    text.to_lowercase() == CANCEL_KEYWORD.to_lowercase()
}

fn cancel_row() -> Vec<String> {
    vec![CANCEL_KEYWORD.to_string()]
}

fn grade_keyboard() -> Markup {
    let grades: Vec<String> = GRADES.map(|g| g.to_string()).collect();
    let mut rows: Vec<Vec<String>> = grades
        .chunks(GRADE_ROW_WIDTH)
        .map(<[String]>::to_vec)
        .collect();
    rows.push(cancel_row());
    Markup::ReplyKeyboard(rows)
}

// ============================================================================
// Dialog prompts
// ============================================================================

pub fn ask_name() -> OutgoingMessage {
    OutgoingMessage::new("Привет! Как тебя зовут?").with_markup(Markup::RemoveKeyboard)
}

pub fn ask_name_for_update() -> OutgoingMessage {
    OutgoingMessage::new("Давайте обновим ваши данные. Как вас зовут?")
        .with_markup(Markup::RemoveKeyboard)
}

pub fn name_required() -> OutgoingMessage {
    OutgoingMessage::new("Пожалуйста, введите имя.")
}

pub fn ask_age() -> OutgoingMessage {
    OutgoingMessage::new("Сколько тебе лет?")
        .with_markup(Markup::ReplyKeyboard(vec![cancel_row()]))
}

pub fn age_not_a_number() -> OutgoingMessage {
    OutgoingMessage::new("Пожалуйста, введите корректный возраст (число).")
}

pub fn age_out_of_range() -> OutgoingMessage {
    OutgoingMessage::new("Пожалуйста, введите реальный возраст от 5 до 100.")
}

pub fn ask_grade() -> OutgoingMessage {
    OutgoingMessage::new("В каком ты классе?").with_markup(grade_keyboard())
}

pub fn grade_required() -> OutgoingMessage {
    OutgoingMessage::new("Пожалуйста, укажите класс.")
}

/// Summary of the collected draft with the confirm/cancel choice
pub fn confirm_summary(draft: &Draft) -> OutgoingMessage {
    OutgoingMessage::new(format!(
        "Проверьте введенные данные:\nИмя: {}\nВозраст: {}\nКласс: {}",
        draft.name, draft.age, draft.grade
    ))
    .with_markup(Markup::Inline(vec![
        vec![InlineButton::new(CONFIRM_LABEL, CONFIRM_TOKEN)],
        vec![InlineButton::new(CANCEL_KEYWORD, CANCEL_TOKEN)],
    ]))
}

pub fn saved() -> OutgoingMessage {
    OutgoingMessage::new("Данные сохранены.").with_markup(Markup::RemoveKeyboard)
}

pub fn save_failed() -> OutgoingMessage {
    OutgoingMessage::new("Произошла ошибка при сохранении данных.")
}

pub fn cancelled() -> OutgoingMessage {
    OutgoingMessage::new("Ввод данных отменен.").with_markup(Markup::RemoveKeyboard)
}

// ============================================================================
// Record access
// ============================================================================

pub fn profile(record: &StudentRecord) -> OutgoingMessage {
    OutgoingMessage::new(format!(
        "Ваши данные:\nИмя: {}\nВозраст: {}\nКласс: {}",
        record.name, record.age, record.grade
    ))
}

pub fn no_profile() -> OutgoingMessage {
    OutgoingMessage::new("Вы еще не предоставили свои данные. Введите /start для начала.")
}

pub fn deleted() -> OutgoingMessage {
    OutgoingMessage::new("Ваши данные были удалены.")
}

pub fn storage_failed() -> OutgoingMessage {
    OutgoingMessage::new("Произошла ошибка при обращении к данным. Попробуйте позже.")
}

pub fn help() -> OutgoingMessage {
    OutgoingMessage::new(
        "Я собираю информацию о студентах.\n\
         Команды:\n\
         /start - начать ввод данных\n\
         /profile - посмотреть ваши данные\n\
         /update - обновить ваши данные\n\
         /delete - удалить ваши данные\n\
         /cancel - отменить ввод данных\n\
         /help - показать эту справку",
    )
}

pub fn not_understood() -> OutgoingMessage {
    OutgoingMessage::new(
        "Извините, я не понимаю это сообщение. Введите /help для списка доступных команд.",
    )
}
