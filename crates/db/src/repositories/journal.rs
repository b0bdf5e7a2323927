use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{JournalEntry, OrderJournalRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderJournalRepository {
    pool: DbPool,
}

impl SqlOrderJournalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderJournalRepository for SqlOrderJournalRepository {
    async fn append(&self, entry: JournalEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO order_journal (
                id, order_id, order_no, correlation_id, event_type, outcome, detail, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(entry.order_id.as_deref())
        .bind(entry.order_no.as_deref())
        .bind(&entry.correlation_id)
        .bind(&entry.event_type)
        .bind(&entry.outcome)
        .bind(&entry.detail)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_order(&self, order_no: &str) -> Result<Vec<JournalEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, order_no, correlation_id, event_type, outcome, detail, occurred_at
            FROM order_journal
            WHERE order_no = ?
            ORDER BY occurred_at ASC, rowid ASC
            "#,
        )
        .bind(order_no)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<JournalEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, order_no, correlation_id, event_type, outcome, detail, occurred_at
            FROM order_journal
            ORDER BY occurred_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM order_journal")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        u64::try_from(count).map_err(|_| RepositoryError::Decode(format!("negative count {count}")))
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<JournalEntry, RepositoryError> {
    let occurred_at: String = row.try_get("occurred_at")?;
    Ok(JournalEntry {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        order_no: row.try_get("order_no")?,
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        outcome: row.try_get("outcome")?,
        detail: row.try_get("detail")?,
        occurred_at: parse_timestamp("occurred_at", occurred_at)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}
