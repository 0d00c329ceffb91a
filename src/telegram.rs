//! Telegram Bot API client
//!
//! A thin JSON-over-HTTPS client for the four methods the bot needs:
//! long-polling `getUpdates`, `sendMessage`, `answerCallbackQuery` and
//! `editMessageReplyMarkup`.

mod error;
pub mod types;

pub use error::{TelegramError, TelegramErrorKind};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use types::{
    AnswerCallbackQueryRequest, ApiResponse, EditMessageReplyMarkupRequest, GetUpdatesRequest,
    ReplyMarkup, SendMessageRequest, Update, User,
};

/// Slack on top of the long-poll timeout before the HTTP request gives up
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

/// Bot API client bound to one bot token
pub struct TelegramClient {
    client: Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(poll_timeout + HTTP_TIMEOUT_MARGIN)
            .build()
            .map_err(|e| TelegramError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    /// The bot's own account
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<(), TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_markup,
        };
        self.call::<_, serde_json::Value>("sendMessage", &request)
            .await
            .map(|_| ())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
    ) -> Result<(), TelegramError> {
        let request = AnswerCallbackQueryRequest { callback_query_id };
        self.call::<_, bool>("answerCallbackQuery", &request)
            .await
            .map(|_| ())
    }

    /// Remove the inline keyboard from a message
    pub async fn clear_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), TelegramError> {
        let request = EditMessageReplyMarkupRequest {
            chat_id,
            message_id,
        };
        self.call::<_, serde_json::Value>("editMessageReplyMarkup", &request)
            .await
            .map(|_| ())
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, TelegramError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                // The URL embeds the token - never log the full reqwest error URL
                let e = e.without_url();
                if e.is_timeout() {
                    TelegramError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    TelegramError::network(format!("Connection failed: {e}"))
                } else {
                    TelegramError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                TelegramError::network(format!("Failed to read response: {}", e.without_url()))
            })?;

        parse_response(method, status.as_u16(), &body)
    }
}

/// Decode a Bot API answer, classifying `ok: false` envelopes and bare HTTP
/// failures
fn parse_response<Resp: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &str,
) -> Result<Resp, TelegramError> {
    let Ok(envelope) = serde_json::from_str::<ApiResponse<Resp>>(body) else {
        return Err(if (200..300).contains(&status) {
            TelegramError::unknown(format!("{method}: failed to parse response: {body}"))
        } else {
            TelegramError::from_api(status, body, None)
        });
    };

    if !envelope.ok {
        let code = envelope.error_code.unwrap_or(status);
        let description = envelope.description.unwrap_or_default();
        let retry_after = envelope.parameters.and_then(|p| p.retry_after);
        return Err(TelegramError::from_api(code, &description, retry_after));
    }

    envelope
        .result
        .ok_or_else(|| TelegramError::unknown(format!("{method}: response without result")))
}
