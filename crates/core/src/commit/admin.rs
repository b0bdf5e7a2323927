use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::domain::order::RemoteOrderStatus;
use crate::errors::BackendError;
use crate::ports::{OrderSummary, OrderTable, PosBackend};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CancelFailure {
    pub order_no: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CancelReport {
    pub voided: Vec<String>,
    pub failures: Vec<CancelFailure>,
}

impl CancelReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Operator-facing summary, one line per failure.
    pub fn message(&self) -> String {
        let mut lines = Vec::new();
        if self.voided.is_empty() {
            lines.push("No orders were cancelled.".to_string());
        } else {
            lines.push(format!("Cancelled: {}", self.voided.join(", ")));
        }
        for failure in &self.failures {
            lines.push(format!("Failed to cancel {}: {}", failure.order_no, failure.reason));
        }
        lines.join("\n")
    }
}

/// Voids orders outside the normal commit flow.
pub struct OrderAdmin {
    backend: Arc<dyn PosBackend>,
    audit: Arc<dyn AuditSink>,
    request_delay: Duration,
}

impl OrderAdmin {
    pub fn new(backend: Arc<dyn PosBackend>, audit: Arc<dyn AuditSink>, request_delay: Duration) -> Self {
        Self { backend, audit, request_delay }
    }

    /// Looks each human order number up in the open table, then the closed
    /// one, and voids it. A failing number never aborts the batch.
    pub async fn cancel_by_numbers(&self, order_numbers: &[String], correlation_id: &str) -> CancelReport {
        let mut report = CancelReport::default();
        for (position, order_no) in order_numbers.iter().enumerate() {
            let order_no = order_no.trim();
            if order_no.is_empty() {
                continue;
            }
            if position > 0 {
                self.pause().await;
            }
            match self.lookup(order_no).await {
                Ok(Some(summary)) => self.void(&summary, correlation_id, &mut report).await,
                Ok(None) => report.failures.push(CancelFailure {
                    order_no: order_no.to_string(),
                    reason: "order not found".to_string(),
                }),
                Err(source) => report.failures.push(CancelFailure {
                    order_no: order_no.to_string(),
                    reason: source.to_string(),
                }),
            }
        }
        report
    }

    /// Voids every order opened yesterday or today.
    pub async fn cancel_all_open(
        &self,
        today: NaiveDate,
        correlation_id: &str,
    ) -> Result<CancelReport, BackendError> {
        let from = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let open = self.backend.list_open_orders(from, today).await?;
        info!(
            event_name = "admin.cancel_all.started",
            correlation_id,
            open_orders = open.len(),
            %from,
            to = %today,
            "cancelling open orders"
        );

        let mut report = CancelReport::default();
        for (position, summary) in open.iter().enumerate() {
            if position > 0 {
                self.pause().await;
            }
            self.void(summary, correlation_id, &mut report).await;
        }
        Ok(report)
    }

    async fn lookup(&self, order_no: &str) -> Result<Option<OrderSummary>, BackendError> {
        if let Some(found) = self.backend.find_order_by_number(OrderTable::Open, order_no).await? {
            return Ok(Some(found));
        }
        self.backend.find_order_by_number(OrderTable::Closed, order_no).await
    }

    async fn void(&self, summary: &OrderSummary, correlation_id: &str, report: &mut CancelReport) {
        match self.backend.set_status(&summary.id, RemoteOrderStatus::Voided).await {
            Ok(()) => {
                self.audit.emit(
                    AuditEvent::new(correlation_id, "order.cancelled", AuditOutcome::Success)
                        .for_order(&summary.id, &summary.order_no),
                );
                report.voided.push(summary.order_no.clone());
            }
            Err(source) => {
                warn!(
                    event_name = "admin.cancel.failed",
                    correlation_id,
                    order_no = %summary.order_no,
                    error = %source,
                    "order could not be voided"
                );
                self.audit.emit(
                    AuditEvent::new(correlation_id, "order.cancelled", AuditOutcome::Failed)
                        .for_order(&summary.id, &summary.order_no)
                        .with_metadata("error", source.to_string()),
                );
                report.failures.push(CancelFailure {
                    order_no: summary.order_no.clone(),
                    reason: source.to_string(),
                });
            }
        }
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }
}
