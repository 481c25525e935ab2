use std::env;

use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail relay rejected message: {0}")]
    Relay(String),
}

/// Outbound mail client posting to an HTTP relay.
///
/// When `EMAIL_API_URL` is unset the mailer runs in log-only mode: the
/// rendered message is logged and the send reports success, so task flows
/// keep working on unconfigured installs.
#[derive(Clone)]
pub struct Mailer {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

impl Mailer {
    pub fn from_env() -> Self {
        Mailer {
            client: Client::new(),
            api_url: env::var("EMAIL_API_URL").ok(),
            api_key: env::var("EMAIL_API_KEY").ok(),
            from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "noreply@internship-api.local".to_string()),
        }
    }

    /// Log-only mailer, used by tests.
    pub fn disabled() -> Self {
        Mailer {
            client: Client::new(),
            api_url: None,
            api_key: None,
            from: "noreply@internship-api.local".to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some()
    }

    pub async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        let url = match &self.api_url {
            Some(url) => url,
            None => {
                info!(recipients = to.len(), %subject, "email not configured, message logged only");
                return Ok(());
            }
        };

        let payload = json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": body,
        });

        let mut request = self.client.post(url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Relay(format!(
                "relay returned status {}",
                response.status()
            )));
        }

        info!(recipients = to.len(), %subject, "email delivered via relay");
        Ok(())
    }
}
