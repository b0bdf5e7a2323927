pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod sink;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use repositories::{
    InMemoryOrderJournalRepository, JournalEntry, OrderJournalRepository, RepositoryError,
    SqlOrderJournalRepository,
};
pub use sink::JournalAuditSink;
