use async_trait::async_trait;
use chrono::Utc;
use docintake_core::models::{AllocationResult, AllocationSession, SessionStatus};
use docintake_core::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::traits::AllocationSessionStore;

/// Sessions only live as long as the process; they are operational state, not records.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, AllocationSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(allocation_id: Uuid) -> AppError {
    AppError::NotFound(format!("allocation session {}", allocation_id))
}

#[async_trait]
impl AllocationSessionStore for InMemorySessionStore {
    async fn create(&self, session: AllocationSession) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.allocation_id) {
            return Err(AppError::Conflict(format!(
                "allocation session {} already exists",
                session.allocation_id
            )));
        }
        sessions.insert(session.allocation_id, session);
        Ok(())
    }

    async fn get(&self, allocation_id: Uuid) -> Result<Option<AllocationSession>, AppError> {
        Ok(self.sessions.read().await.get(&allocation_id).cloned())
    }

    async fn set_current_file(
        &self,
        allocation_id: Uuid,
        file_name: Option<String>,
    ) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&allocation_id)
            .ok_or_else(|| missing(allocation_id))?;
        session.current_file = file_name;
        Ok(())
    }

    async fn record_result(
        &self,
        allocation_id: Uuid,
        result: AllocationResult,
    ) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&allocation_id)
            .ok_or_else(|| missing(allocation_id))?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "allocation session {} is already {}",
                allocation_id, session.status
            )));
        }
        session.results.push(result);
        session.processed_files += 1;
        Ok(())
    }

    async fn request_cancel(&self, allocation_id: Uuid) -> Result<bool, AppError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&allocation_id) {
            Some(session) if !session.status.is_terminal() => {
                session.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish(&self, allocation_id: Uuid, status: SessionStatus) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&allocation_id)
            .ok_or_else(|| missing(allocation_id))?;
        session.status = status;
        session.current_file = None;
        session.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn evict_finished(&self, ttl: Duration) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.finished_at {
            Some(finished_at) => (now - finished_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true),
            None => true,
        });
        Ok(before - sessions.len())
    }
}
