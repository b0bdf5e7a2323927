use tokio::sync::RwLock;

use super::{JournalEntry, OrderJournalRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOrderJournalRepository {
    entries: RwLock<Vec<JournalEntry>>,
}

#[async_trait::async_trait]
impl OrderJournalRepository for InMemoryOrderJournalRepository {
    async fn append(&self, entry: JournalEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        if entries.iter().all(|existing| existing.id != entry.id) {
            entries.push(entry);
        }
        Ok(())
    }

    async fn list_for_order(&self, order_no: &str) -> Result<Vec<JournalEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.order_no.as_deref() == Some(order_no))
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<JournalEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.entries.read().await.len() as u64)
    }
}
