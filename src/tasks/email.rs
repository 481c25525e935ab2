use std::env;
use std::time::Duration;

use sqlx::{Row, SqlitePool};
use tracing::{warn, info};

use crate::services::email::Mailer;
use crate::tasks::{Task, TaskError, TaskQueue};

pub const BULK_MAX_RETRIES: u32 = 3;

fn bulk_retry_delay() -> Duration {
    let secs = env::var("BULK_RETRY_DELAY_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60);
    Duration::from_secs(secs)
}

struct Recipient {
    username: String,
    email: String,
    date_joined: String,
}

async fn fetch_recipient(pool: &SqlitePool, user_id: &str) -> Result<Option<Recipient>, sqlx::Error> {
    let row = sqlx::query("SELECT username, email, date_joined FROM users WHERE id = ? LIMIT 1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| Recipient {
        username: r.get::<String, _>("username"),
        email: r.get::<String, _>("email"),
        date_joined: r.get::<String, _>("date_joined"),
    }))
}

/// Welcome mail for a freshly registered account. A missing user is reported
/// in the task result, not treated as a failure.
pub async fn send_welcome_email(
    pool: &SqlitePool,
    mailer: &Mailer,
    user_id: &str,
) -> Result<String, TaskError> {
    let user = match fetch_recipient(pool, user_id).await? {
        Some(user) => user,
        None => {
            warn!(%user_id, "welcome email for unknown user");
            return Ok(format!("User with ID {} not found", user_id));
        }
    };

    let subject = "Welcome to the Internship API!";
    let body = format!(
        "Hello {username}!\n\n\
         Welcome to our Internship API platform. Your account has been successfully created.\n\n\
         Here's what you can do now:\n\
         - Access protected endpoints using your authentication token\n\
         - View your profile at /api/profile\n\
         - Explore the API documentation\n\n\
         Account Details:\n\
         - Username: {username}\n\
         - Email: {email}\n\
         - Registration Date: {joined}\n\n\
         Best regards,\n\
         Internship API Team",
        username = user.username,
        email = user.email,
        joined = user.date_joined,
    );

    mailer.send(&[user.email.clone()], subject, &body).await?;
    Ok(format!("Welcome email sent to {}", user.email))
}

pub async fn send_notification_email(
    pool: &SqlitePool,
    mailer: &Mailer,
    user_id: &str,
    subject: &str,
    message: &str,
) -> Result<String, TaskError> {
    let user = match fetch_recipient(pool, user_id).await? {
        Some(user) => user,
        None => {
            warn!(%user_id, "notification email for unknown user");
            return Ok(format!("User with ID {} not found", user_id));
        }
    };

    if user.email.is_empty() {
        return Ok("Email not sent - user has no address".to_string());
    }

    mailer.send(&[user.email.clone()], subject, message).await?;
    Ok(format!("Notification email sent to {}", user.email))
}

pub async fn send_password_reset_email(
    pool: &SqlitePool,
    mailer: &Mailer,
    user_id: &str,
    reset_link: &str,
) -> Result<String, TaskError> {
    let user = match fetch_recipient(pool, user_id).await? {
        Some(user) => user,
        None => {
            warn!(%user_id, "password reset email for unknown user");
            return Ok(format!("User with ID {} not found", user_id));
        }
    };

    let subject = "Password Reset - Internship API";
    let body = format!(
        "Hello {username},\n\n\
         You requested a password reset for your Internship API account.\n\n\
         Click the link below to reset your password:\n\
         {link}\n\n\
         If you didn't request this reset, please ignore this email.\n\n\
         Best regards,\n\
         Internship API Team",
        username = user.username,
        link = reset_link,
    );

    mailer.send(&[user.email.clone()], subject, &body).await?;
    Ok(format!("Password reset email sent to {}", user.email))
}

/// One mail to every staff user with a non-empty address.
pub async fn send_admin_notification(
    pool: &SqlitePool,
    mailer: &Mailer,
    subject: &str,
    message: &str,
) -> Result<String, TaskError> {
    let emails: Vec<String> =
        sqlx::query_scalar("SELECT email FROM users WHERE is_staff = 1 AND email != ''")
            .fetch_all(pool)
            .await?;

    if emails.is_empty() {
        return Ok("No admin users found".to_string());
    }

    let subject = format!("[Internship API] {}", subject);
    mailer.send(&emails, &subject, message).await?;
    Ok(format!("Admin notification sent to {} admins", emails.len()))
}

/// Mail each user individually; on partial failure the task re-enqueues
/// itself after a delay, up to BULK_MAX_RETRIES attempts.
pub async fn send_bulk_notifications(
    pool: &SqlitePool,
    mailer: &Mailer,
    queue: &TaskQueue,
    user_ids: &[String],
    subject: &str,
    message: &str,
    retries: u32,
) -> Result<String, TaskError> {
    let mut sent_count = 0usize;
    let mut failed: Vec<String> = Vec::new();

    for user_id in user_ids {
        // Treat a failed lookup like a failed send so one bad recipient can't
        // abort the batch; the retry pass picks it up again.
        let user = match fetch_recipient(pool, user_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(%user_id, error = %e, "bulk notification lookup failed");
                failed.push(user_id.clone());
                continue;
            }
        };
        match user {
            Some(user) if !user.email.is_empty() => {
                let body = format!("Hello {},\n\n{}", user.username, message);
                match mailer.send(&[user.email.clone()], subject, &body).await {
                    Ok(()) => sent_count += 1,
                    Err(e) => {
                        warn!(email = %user.email, error = %e, "bulk notification send failed");
                        failed.push(user_id.clone());
                    }
                }
            }
            _ => failed.push(user_id.clone()),
        }
    }

    if !failed.is_empty() && retries < BULK_MAX_RETRIES {
        info!(failed = failed.len(), retries, "retrying bulk notification for failed recipients");
        let retry = Task::SendBulkNotifications {
            user_ids: failed.clone(),
            subject: subject.to_string(),
            message: message.to_string(),
            retries: retries + 1,
        };
        let queue = queue.clone();
        let delay = bulk_retry_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(retry);
        });
    }

    Ok(format!(
        "Bulk notification completed: sent {}, failed {}",
        sent_count,
        failed.len()
    ))
}
