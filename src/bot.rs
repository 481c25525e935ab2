use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::TelegramUser;
use crate::services::telegram::{IncomingMessage, Sender, TelegramClient, TelegramError};

#[derive(Error, Debug)]
pub enum BotError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("telegram error: {0}")]
    Telegram(#[from] TelegramError),
}

/// Long-polling loop. Errors are logged and polling continues; the bot never
/// takes the web tier down.
pub fn spawn(pool: SqlitePool, bot_token: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = TelegramClient::new(&bot_token);
        let mut offset: i64 = 0;
        info!("telegram bot polling started");

        loop {
            match client.get_updates(offset, 30).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            if let Err(e) = handle_message(&pool, &client, &message).await {
                                error!(error = %e, "failed to handle bot message");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    })
}

/// `/start@SomeBot arg` -> `start`
pub fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

/// Create or refresh the telegram_users row for a sender. telegram_id is
/// globally unique; repeated contact updates the stored identity fields.
pub async fn upsert_telegram_user(
    pool: &SqlitePool,
    sender: &Sender,
    chat_id: i64,
) -> Result<TelegramUser, sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();

    let existing = sqlx::query("SELECT id FROM telegram_users WHERE telegram_id = ? LIMIT 1")
        .bind(sender.id)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(row) => {
            let id = row.get::<String, _>("id");
            sqlx::query(
                "UPDATE telegram_users
                 SET username = ?, first_name = ?, last_name = ?, chat_id = ?,
                     language_code = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&sender.username)
            .bind(&sender.first_name)
            .bind(&sender.last_name)
            .bind(chat_id)
            .bind(&sender.language_code)
            .bind(&now)
            .bind(&id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO telegram_users
                 (id, telegram_id, username, first_name, last_name, chat_id, language_code,
                  created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(sender.id)
            .bind(&sender.username)
            .bind(&sender.first_name)
            .bind(&sender.last_name)
            .bind(chat_id)
            .bind(&sender.language_code)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;
        }
    }

    fetch_telegram_user(pool, sender.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_telegram_user(
    pool: &SqlitePool,
    telegram_id: i64,
) -> Result<Option<TelegramUser>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, telegram_id, username, first_name, last_name, chat_id, language_code,
                user_id, is_active, created_at, updated_at
         FROM telegram_users WHERE telegram_id = ? LIMIT 1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TelegramUser {
        id: r.get::<String, _>("id"),
        telegram_id: r.get::<i64, _>("telegram_id"),
        username: r.try_get::<Option<String>, _>("username").unwrap_or(None),
        first_name: r.try_get::<Option<String>, _>("first_name").unwrap_or(None),
        last_name: r.try_get::<Option<String>, _>("last_name").unwrap_or(None),
        chat_id: r.get::<i64, _>("chat_id"),
        language_code: r.try_get::<Option<String>, _>("language_code").unwrap_or(None),
        user_id: r.try_get::<Option<String>, _>("user_id").unwrap_or(None),
        is_active: r.get::<i64, _>("is_active") != 0,
        created_at: r.get::<String, _>("created_at"),
        updated_at: r.get::<String, _>("updated_at"),
    }))
}

pub async fn log_bot_message(
    pool: &SqlitePool,
    telegram_user_id: &str,
    message_type: &str,
    message_text: Option<&str>,
    command: Option<&str>,
    response_sent: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO bot_messages
         (id, telegram_user_id, message_type, message_text, command, response_sent, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(telegram_user_id)
    .bind(message_type)
    .bind(message_text)
    .bind(command)
    .bind(response_sent as i64)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

async fn handle_message(
    pool: &SqlitePool,
    client: &TelegramClient,
    message: &IncomingMessage,
) -> Result<(), BotError> {
    let sender = match &message.from {
        Some(sender) if !sender.is_bot => sender,
        _ => return Ok(()),
    };
    let text = message.text.as_deref().unwrap_or("");
    let chat_id = message.chat.id;

    let telegram_user = upsert_telegram_user(pool, sender, chat_id).await?;

    let command = parse_command(text);
    let reply = match command {
        Some("start") => start_reply(&telegram_user, sender, chat_id),
        Some("help") => HELP_MESSAGE.to_string(),
        Some("info") => INFO_MESSAGE.to_string(),
        Some("status") => status_reply(pool, &telegram_user).await?,
        Some(_) => "Unknown command. Use /help to see available commands.".to_string(),
        None => {
            "I understand commands only. Try /start, /help, /status or /info.".to_string()
        }
    };

    let sent = client.send_message(chat_id, &reply).await;
    let response_sent = sent.is_ok();
    if let Err(e) = &sent {
        warn!(chat_id, error = %e, "failed to send bot reply");
    }

    let message_type = if command.is_some() { "command" } else { "text" };
    log_bot_message(
        pool,
        &telegram_user.id,
        message_type,
        Some(text),
        command,
        response_sent,
    )
    .await?;

    Ok(())
}

fn start_reply(telegram_user: &TelegramUser, sender: &Sender, chat_id: i64) -> String {
    let name = {
        let full = telegram_user.full_name();
        if full.is_empty() {
            sender.first_name.clone().unwrap_or_else(|| "there".to_string())
        } else {
            full
        }
    };

    format!(
        "*Welcome to the Internship Bot!*\n\n\
         Hello {name}!\n\n\
         Your Telegram information has been saved:\n\
         - Username: @{username}\n\
         - User ID: `{id}`\n\
         - Chat ID: `{chat}`\n\n\
         Available commands:\n\
         /start - Show this welcome message\n\
         /help - Get help information\n\
         /status - Check your registration status\n\
         /info - Get API information",
        name = name,
        username = sender.username.as_deref().unwrap_or("Not set"),
        id = sender.id,
        chat = chat_id,
    )
}

async fn status_reply(pool: &SqlitePool, user: &TelegramUser) -> Result<String, BotError> {
    let linked = match &user.user_id {
        Some(user_id) => {
            sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = ? LIMIT 1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let link_line = match linked {
        Some(username) => format!("Linked account: {}", username),
        None => "No account linked. Register at the API endpoints to link one.".to_string(),
    };

    let full_name = user.full_name();
    Ok(format!(
        "*Your Status*\n\n\
         Telegram account registered\n\
         - Username: @{username}\n\
         - Full name: {full_name}\n\
         - Registration date: {created}\n\
         - Status: {active}\n\n\
         {link}",
        username = user.username.as_deref().unwrap_or("Not set"),
        full_name = if full_name.is_empty() { "Not set" } else { &full_name },
        created = user.created_at,
        active = if user.is_active { "Active" } else { "Inactive" },
        link = link_line,
    ))
}

const HELP_MESSAGE: &str = "*Internship Bot Help*\n\n\
This bot is connected to a REST API.\n\n\
*Available Commands:*\n\
/start - Initialize your account and get a welcome message\n\
/help - Show this help message\n\
/status - Check your registration status\n\
/info - Get API endpoint information\n\n\
*How to use the API:*\n\
1. Register at `/api/register`\n\
2. Login at `/api/login`\n\
3. Use your token to access protected endpoints";

const INFO_MESSAGE: &str = "*API Information*\n\n\
*Public Endpoints:*\n\
- `GET /api/public` - Public information\n\
- `POST /api/register` - User registration\n\
- `POST /api/login` - User login\n\n\
*Protected Endpoints:*\n\
- `GET /api/protected` - Protected data\n\
- `GET /api/profile` - User profile\n\
- `PUT /api/profile` - Update profile\n\
- `GET /api/logs` - API logs (admin only)\n\n\
*Authentication:*\n\
Use token authentication in the header:\n\
`Authorization: Token your-token-here`";

#[cfg(test)]
mod tests {
    use super::parse_command;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(parse_command("/start"), Some("start"));
        assert_eq!(parse_command("/status extra args"), Some("status"));
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(parse_command("/help@InternshipBot"), Some("help"));
    }

    #[test]
    fn rejects_non_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("/"), None);
    }
}
