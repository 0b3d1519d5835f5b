//! Configuration module
//!
//! Environment-driven configuration for the intake pipeline: database, storage,
//! processing queue, retention defaults and outbound email.

use std::env;
use std::str::FromStr;

use crate::models::{
    DocumentKind, RetentionPolicy, RetentionTrigger, SettingsSnapshot, MAX_RETENTION_DAYS,
};

const MAX_CONNECTIONS: u32 = 20;
const STORAGE_PATH: &str = "./data";
const QUEUE_MAX_WORKERS: usize = 2;
const QUEUE_MAX_ATTEMPTS: u32 = 3;
const QUEUE_BACKOFF_BASE_SECS: u64 = 2;
const QUEUE_POLL_INTERVAL_MS: u64 = 500;
const QUEUE_JOB_TIMEOUT_SECS: u64 = 300;
const RETENTION_INTERVAL_SECS: u64 = 3600;
const ALLOCATION_SESSION_TTL_SECS: u64 = 3600;
const SMTP_PORT: u16 = 587;

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub poll_interval_ms: u64,
    pub job_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: QUEUE_MAX_WORKERS,
            max_attempts: QUEUE_MAX_ATTEMPTS,
            backoff_base_secs: QUEUE_BACKOFF_BASE_SECS,
            poll_interval_ms: QUEUE_POLL_INTERVAL_MS,
            job_timeout_secs: QUEUE_JOB_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub tls: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Absent means in-memory repositories.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub storage_path: String,
    pub queue: QueueConfig,
    pub retention_interval_secs: u64,
    /// Default policy; per-type overrides below take precedence.
    pub retention_period_days: Option<u32>,
    pub retention_trigger: RetentionTrigger,
    pub invoice_retention_days: Option<u32>,
    pub credit_note_retention_days: Option<u32>,
    pub statement_retention_days: Option<u32>,
    pub allocation_session_ttl_secs: u64,
    pub smtp: SmtpConfig,
    pub environment: String,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| value.trim().parse().ok())
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .to_lowercase()
        .parse()
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let retention_trigger = match env::var("RETENTION_TRIGGER") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => RetentionTrigger::UploadDate,
        };

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            storage_path: env::var("STORAGE_PATH").unwrap_or_else(|_| STORAGE_PATH.to_string()),
            queue: QueueConfig {
                max_workers: parse_or("QUEUE_MAX_WORKERS", QUEUE_MAX_WORKERS),
                max_attempts: parse_or("QUEUE_MAX_ATTEMPTS", QUEUE_MAX_ATTEMPTS),
                backoff_base_secs: parse_or("QUEUE_BACKOFF_BASE_SECS", QUEUE_BACKOFF_BASE_SECS),
                poll_interval_ms: parse_or("QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
                job_timeout_secs: parse_or("QUEUE_JOB_TIMEOUT_SECS", QUEUE_JOB_TIMEOUT_SECS),
            },
            retention_interval_secs: parse_or("RETENTION_INTERVAL_SECS", RETENTION_INTERVAL_SECS),
            retention_period_days: parse_opt("RETENTION_PERIOD_DAYS"),
            retention_trigger,
            invoice_retention_days: parse_opt("INVOICE_RETENTION_DAYS"),
            credit_note_retention_days: parse_opt("CREDIT_NOTE_RETENTION_DAYS"),
            statement_retention_days: parse_opt("STATEMENT_RETENTION_DAYS"),
            allocation_session_ttl_secs: parse_or(
                "ALLOCATION_SESSION_TTL_SECS",
                ALLOCATION_SESSION_TTL_SECS,
            ),
            smtp: SmtpConfig {
                enabled: flag("EMAIL_NOTIFICATIONS_ENABLED", false),
                host: env::var("SMTP_HOST").ok(),
                port: parse_opt("SMTP_PORT").or(Some(SMTP_PORT)),
                user: env::var("SMTP_USER").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: env::var("SMTP_FROM").ok(),
                tls: flag("SMTP_TLS", true),
            },
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.queue.max_workers == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_WORKERS must be at least 1"));
        }

        if self.queue.max_attempts == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_ATTEMPTS must be at least 1"));
        }

        if self.retention_interval_secs == 0 {
            return Err(anyhow::anyhow!("RETENTION_INTERVAL_SECS must be positive"));
        }

        for (name, days) in [
            ("RETENTION_PERIOD_DAYS", self.retention_period_days),
            ("INVOICE_RETENTION_DAYS", self.invoice_retention_days),
            ("CREDIT_NOTE_RETENTION_DAYS", self.credit_note_retention_days),
            ("STATEMENT_RETENTION_DAYS", self.statement_retention_days),
        ] {
            if days.is_some_and(|days| days > MAX_RETENTION_DAYS) {
                return Err(anyhow::anyhow!(
                    "{} must be at most {} days",
                    name,
                    MAX_RETENTION_DAYS
                ));
            }
        }

        if self.smtp.enabled && (self.smtp.host.is_none() || self.smtp.from.is_none()) {
            return Err(anyhow::anyhow!(
                "EMAIL_NOTIFICATIONS_ENABLED=true requires SMTP_HOST and SMTP_FROM to be set"
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    /// Initial settings snapshot built from the retention variables.
    pub fn retention_snapshot(&self) -> SettingsSnapshot {
        let policy = |override_days: Option<u32>| RetentionPolicy {
            period_days: override_days.or(self.retention_period_days),
            trigger: self.retention_trigger,
        };
        SettingsSnapshot::default()
            .with_retention(DocumentKind::Invoice, policy(self.invoice_retention_days))
            .with_retention(
                DocumentKind::CreditNote,
                policy(self.credit_note_retention_days),
            )
            .with_retention(DocumentKind::Statement, policy(self.statement_retention_days))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            storage_path: STORAGE_PATH.to_string(),
            queue: QueueConfig::default(),
            retention_interval_secs: RETENTION_INTERVAL_SECS,
            retention_period_days: None,
            retention_trigger: RetentionTrigger::UploadDate,
            invoice_retention_days: None,
            credit_note_retention_days: None,
            statement_retention_days: None,
            allocation_session_ttl_secs: ALLOCATION_SESSION_TTL_SECS,
            smtp: SmtpConfig::default(),
            environment: "development".to_string(),
        }
    }
}
