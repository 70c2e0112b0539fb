//! Best-effort side-channel alerts.
//!
//! Alert delivery must never mask the error that triggered it: callers go through
//! [`notify_best_effort`], which logs and swallows delivery failures.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use crate::config::EmailCredentials;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Send an alert, logging instead of propagating any delivery error
pub async fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    match notifier.send(subject, body).await {
        Ok(()) => tracing::info!("Alert sent: {}", subject),
        Err(e) => tracing::warn!("Failed to send alert '{}': {:#}", subject, e),
    }
}

/// Pick the email notifier when credentials exist, otherwise one that only logs
pub fn from_credentials(
    email: Option<&EmailCredentials>,
    smtp_host: &str,
    timeout: Duration,
) -> Box<dyn Notifier> {
    match email {
        Some(creds) => Box::new(EmailNotifier::new(creds.clone(), smtp_host, timeout)),
        None => Box::new(DisabledNotifier),
    }
}

/// SMTP over implicit TLS
pub struct EmailNotifier {
    credentials: EmailCredentials,
    smtp_host: String,
    timeout: Duration,
}

impl EmailNotifier {
    pub fn new(credentials: EmailCredentials, smtp_host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            credentials,
            smtp_host: smtp_host.into(),
            timeout,
        }
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        let from: Mailbox = self
            .credentials
            .user
            .parse()
            .context("EMAIL_USER is not a valid address")?;
        let to: Mailbox = self
            .credentials
            .recipient
            .parse()
            .context("RECIPIENT_EMAIL is not a valid address")?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("Failed to build alert email")
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;
        let mailer = SmtpTransport::relay(&self.smtp_host)
            .with_context(|| format!("Invalid SMTP relay {}", self.smtp_host))?
            .credentials(SmtpCredentials::new(
                self.credentials.user.clone(),
                self.credentials.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .context("Alert task panicked")?
            .context("SMTP delivery failed")?;

        tracing::debug!("Alert email delivered to {}", self.credentials.recipient);
        Ok(())
    }
}

/// Used when no alert credentials are configured
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, subject: &str, _body: &str) -> Result<()> {
        tracing::warn!("Alert email not configured, skipping alert: {}", subject);
        Ok(())
    }
}
