//! Audit sink that persists commit-protocol events to the order journal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use kasir_core::audit::{AuditEvent, AuditSink};

use crate::repositories::{JournalEntry, OrderJournalRepository};

/// `emit` never blocks the caller; a background task drains the queue into
/// the repository. The task ends once every sink clone is dropped.
#[derive(Clone)]
pub struct JournalAuditSink {
    sender: mpsc::UnboundedSender<JournalEntry>,
}

impl JournalAuditSink {
    pub fn spawn(repository: Arc<dyn OrderJournalRepository>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<JournalEntry>();
        let writer = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                let event_type = entry.event_type.clone();
                let order_no = entry.order_no.clone().unwrap_or_default();
                match repository.append(entry).await {
                    Ok(()) => debug!(
                        event_name = "journal.entry.appended",
                        journal_event = %event_type,
                        order_no = %order_no,
                        "journal entry appended"
                    ),
                    Err(source) => error!(
                        event_name = "journal.entry.failed",
                        journal_event = %event_type,
                        order_no = %order_no,
                        error = %source,
                        "journal entry could not be written"
                    ),
                }
            }
        });
        (Self { sender }, writer)
    }
}

impl AuditSink for JournalAuditSink {
    fn emit(&self, event: AuditEvent) {
        if self.sender.send(JournalEntry::from(&event)).is_err() {
            error!(
                event_name = "journal.sink.closed",
                audit_event = %event.event_type,
                "journal writer has stopped; audit event dropped"
            );
        }
    }
}
