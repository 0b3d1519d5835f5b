//! Outbound notifications to company contacts.
//!
//! Delivery is fire-and-forget: callers queue [`crate::outbox::SideEffect`]s and failures
//! are only logged.

mod email;
mod templates;

pub use email::EmailNotifier;
pub use templates::{render, Rendered, DOCUMENT_AVAILABLE, DOCUMENT_DELETED};

use async_trait::async_trait;
use docintake_core::SmtpConfig;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),
    #[error("No valid recipient addresses")]
    NoRecipients,
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        template: &str,
        recipients: &[String],
        context: &Value,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        template: &str,
        recipients: &[String],
        context: &Value,
    ) -> Result<(), NotifyError> {
        let rendered = render(template, context)?;
        tracing::info!(
            template,
            recipients = recipients.len(),
            subject = %rendered.subject,
            "Notification (email disabled)"
        );
        Ok(())
    }
}

/// SMTP when configured, otherwise the log.
pub fn notifier_from_config(smtp: &SmtpConfig) -> Arc<dyn Notifier> {
    match EmailNotifier::from_config(smtp) {
        Some(email) => Arc::new(email),
        None => Arc::new(LogNotifier),
    }
}
