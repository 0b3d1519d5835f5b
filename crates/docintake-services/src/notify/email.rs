//! SMTP delivery for company notifications.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;
use std::sync::Arc;

use docintake_core::SmtpConfig;

use super::{render, Notifier, NotifyError};

const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Clone)]
pub struct EmailNotifier {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Returns `None` when email is disabled or SMTP is not fully configured.
    pub fn from_config(smtp: &SmtpConfig) -> Option<Self> {
        if !smtp.enabled {
            tracing::debug!("Email notifications disabled (EMAIL_NOTIFICATIONS_ENABLED=false)");
            return None;
        }
        let host = smtp.host.as_deref()?;
        let from: Mailbox = match smtp.from.as_deref()?.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                tracing::error!(error = %e, "Invalid SMTP_FROM, email notifications disabled");
                return None;
            }
        };
        let port = smtp.port.unwrap_or(DEFAULT_SMTP_PORT);
        let credentials = match (smtp.user.as_deref(), smtp.password.as_deref()) {
            (Some(user), Some(password)) => {
                Some(Credentials::new(user.to_string(), password.to_string()))
            }
            _ => None,
        };

        let builder = if smtp.tls {
            match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host) {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::error!(error = %e, host = %host, "Failed to build SMTP relay");
                    return None;
                }
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(port);
        let builder = match credentials {
            Some(credentials) => builder.credentials(credentials),
            None => builder,
        };

        tracing::info!(host = %host, port, tls = smtp.tls, "Email notifier initialized");

        Some(Self {
            mailer: Arc::new(builder.build()),
            from,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        template: &str,
        recipients: &[String],
        context: &Value,
    ) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            return Ok(());
        }
        let to: Vec<Mailbox> = recipients.iter().filter_map(|r| r.parse().ok()).collect();
        if to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let rendered = render(template, context)?;
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(rendered.subject);
        for mailbox in to.iter().cloned() {
            builder = builder.to(mailbox);
        }
        let email = builder
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.body)
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        tracing::info!(template, count = to.len(), "Notification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_yields_none() {
        let smtp = SmtpConfig {
            enabled: false,
            host: Some("smtp.example.com".to_string()),
            from: Some("noreply@example.com".to_string()),
            ..Default::default()
        };
        assert!(EmailNotifier::from_config(&smtp).is_none());
    }

    #[test]
    fn missing_host_yields_none() {
        let smtp = SmtpConfig {
            enabled: true,
            from: Some("noreply@example.com".to_string()),
            ..Default::default()
        };
        assert!(EmailNotifier::from_config(&smtp).is_none());
    }

    #[tokio::test]
    async fn plain_smtp_builds_without_connecting() {
        let smtp = SmtpConfig {
            enabled: true,
            host: Some("localhost".to_string()),
            port: Some(2525),
            from: Some("Docs <noreply@example.com>".to_string()),
            tls: false,
            ..Default::default()
        };
        assert!(EmailNotifier::from_config(&smtp).is_some());
    }
}
