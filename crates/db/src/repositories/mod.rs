use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kasir_core::audit::AuditEvent;

pub mod journal;
pub mod memory;

pub use journal::SqlOrderJournalRepository;
pub use memory::InMemoryOrderJournalRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One row of the order journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub order_id: Option<String>,
    pub order_no: Option<String>,
    pub correlation_id: String,
    pub event_type: String,
    pub outcome: String,
    /// JSON object of event metadata.
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&AuditEvent> for JournalEntry {
    fn from(event: &AuditEvent) -> Self {
        Self {
            id: event.event_id.clone(),
            order_id: event.order_id.as_ref().map(|id| id.0.clone()),
            order_no: event.order_no.clone(),
            correlation_id: event.correlation_id.clone(),
            event_type: event.event_type.clone(),
            outcome: event.outcome.as_str().to_string(),
            detail: serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".to_string()),
            occurred_at: event.occurred_at,
        }
    }
}

#[async_trait]
pub trait OrderJournalRepository: Send + Sync {
    async fn append(&self, entry: JournalEntry) -> Result<(), RepositoryError>;

    /// Entries for one human order number, oldest first.
    async fn list_for_order(&self, order_no: &str) -> Result<Vec<JournalEntry>, RepositoryError>;

    /// Newest entries first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<JournalEntry>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}
