//! Side effects collected during a core write and dispatched afterwards.
//!
//! Nothing here can fail the operation that queued it.

use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::notify::Notifier;

#[derive(Debug, Clone)]
pub enum SideEffect {
    Notify {
        template: &'static str,
        recipients: Vec<String>,
        context: Value,
    },
    /// Activity trail entry, emitted on the `docintake::activity` target.
    Activity {
        action: &'static str,
        subject_id: Uuid,
        details: Value,
    },
}

#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<SideEffect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: SideEffect) {
        self.effects.push(effect);
    }

    pub fn notify(&mut self, template: &'static str, recipients: Vec<String>, context: Value) {
        self.push(SideEffect::Notify {
            template,
            recipients,
            context,
        });
    }

    pub fn activity(&mut self, action: &'static str, subject_id: Uuid, details: Value) {
        self.push(SideEffect::Activity {
            action,
            subject_id,
            details,
        });
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn notification_count(&self) -> usize {
        self.effects
            .iter()
            .filter(|effect| matches!(effect, SideEffect::Notify { .. }))
            .count()
    }

    /// Spawn every effect as a detached task. The handles are returned for callers that
    /// want to wait; dropping them does not cancel delivery.
    pub fn dispatch(self, notifier: Arc<dyn Notifier>) -> Vec<JoinHandle<()>> {
        self.effects
            .into_iter()
            .map(|effect| {
                let notifier = notifier.clone();
                tokio::spawn(async move { deliver(effect, notifier.as_ref()).await })
            })
            .collect()
    }
}

async fn deliver(effect: SideEffect, notifier: &dyn Notifier) {
    match effect {
        SideEffect::Notify {
            template,
            recipients,
            context,
        } => {
            if let Err(e) = notifier.notify(template, &recipients, &context).await {
                tracing::warn!(
                    error = %e,
                    template,
                    recipients = recipients.len(),
                    "Notification failed"
                );
            }
        }
        SideEffect::Activity {
            action,
            subject_id,
            details,
        } => {
            tracing::info!(
                target: "docintake::activity",
                action,
                subject_id = %subject_id,
                details = %details,
                "Activity"
            );
        }
    }
}
