//! Outbound mail collaborator.
//!
//! The auth core only needs "send this email"; delivery goes through an HTTP
//! mail relay (`HttpMailer`) in production. Callers must treat every
//! [`MailError`] as non-fatal on enumeration-sensitive paths.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Default upper bound for one delivery attempt.
pub const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Mail delivery errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Mail relay rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Sends rendered emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

/// Render the password reset email.
pub fn reset_email(to: &str, reset_url: &Url) -> OutboundEmail {
    let html = format!(
        r#"<div style="font-family: Inter, system-ui, Arial; color:#0f172a;">
  <h2>Reset your Optimus password</h2>
  <p>We received a request to reset your password. Use the link below to set a new password. This link expires in 1 hour.</p>
  <p><a href="{reset_url}">Reset password</a></p>
  <p>If you didn't request this, you can ignore this email.</p>
</div>"#
    );
    OutboundEmail {
        to: to.to_string(),
        subject: "Optimus: reset your password".to_string(),
        html,
    }
}

/// Mail relay configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Relay endpoint accepting `{from, to, subject, html}` JSON.
    pub api_url: Option<Url>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: "no-reply@optimus.com".to_string(),
            timeout: DEFAULT_MAIL_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Delivers mail by POSTing JSON to an HTTP relay.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Transport(format!("client build: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        let payload = RelayPayload {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        };
        let mut req = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }
        debug!(subject = %email.subject, "mail relayed");
        Ok(())
    }
}

/// Drops mail after logging the recipient. Used when no relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "no mail relay configured; email not delivered");
        Ok(())
    }
}

/// Keeps sent mail in memory.
#[derive(Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryOutbox {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

/// Build the mailer for the given config.
pub fn from_config(config: &MailConfig) -> Result<std::sync::Arc<dyn Mailer>, MailError> {
    Ok(match &config.api_url {
        Some(url) => std::sync::Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
            config.timeout,
        )?),
        None => std::sync::Arc::new(LogMailer),
    })
}
