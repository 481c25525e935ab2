use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Serialize)]
struct SendMessageRequest {
    chat_id: i64,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<Sender>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    client: Client,
    api_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        TelegramClient {
            client: Client::new(),
            api_url: format!("https://api.telegram.org/bot{}", bot_token),
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text: text.to_string(),
            parse_mode: Some("Markdown".to_string()),
        };

        let url = format!("{}/sendMessage", self.api_url);
        let response: ApiResponse<SentMessage> = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if response.ok {
            response
                .result
                .map(|m| m.message_id)
                .ok_or_else(|| TelegramError::Api("no message id in response".to_string()))
        } else {
            Err(TelegramError::Api(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let url = format!("{}/getUpdates", self.api_url);
        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(&url)
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            .send()
            .await?
            .json()
            .await?;

        if response.ok {
            Ok(response.result.unwrap_or_default())
        } else {
            Err(TelegramError::Api(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}
