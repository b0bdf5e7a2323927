//! Staged write of one resolved order into the POS backend.
//!
//! Every step after order creation either advances the order's stage or
//! voids the order before the error is returned, so a failed run never
//! leaves a half-built open order behind.

pub mod admin;
pub mod discount;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::cart::aggregate::{aggregate, subtotal};
use crate::cart::resolver::CatalogResolver;
use crate::config::PaymentModeIndices;
use crate::domain::order::{
    LineOrigin, OrderLine, OrderStage, RemoteOrder, RemoteOrderStatus, SkuKey,
};
use crate::domain::request::{LineRequest, ResolvedOrderRequest};
use crate::errors::{BackendError, OrderError, ResolutionError};
use crate::policy::{AccessoryPolicy, DeliveryPolicy};
use crate::ports::{CustomerSpec, LineUpdate, NewOrder, OrderDetail, PaymentRecord, PosBackend};

#[derive(Clone, Debug, Default)]
pub struct CommitSettings {
    /// Pause between successive backend calls on the same order.
    pub request_delay: Duration,
    pub payment_modes: PaymentModeIndices,
    pub delivery: DeliveryPolicy,
    pub accessories: AccessoryPolicy,
}

/// Facts about one request that come from outside the translated order.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitContext {
    pub correlation_id: String,
    pub order_date: NaiveDate,
    /// Address text matched against the free-delivery areas.
    pub zone_text: String,
    pub distance_km: f64,
    pub notes_summary: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommittedOrder {
    pub order: RemoteOrder,
    pub detail: OrderDetail,
    pub lines: Vec<OrderLine>,
    pub payment_recorded: bool,
    pub receipt_url: Option<String>,
}

pub struct OrderCommitProtocol {
    resolver: CatalogResolver,
    backend: Arc<dyn PosBackend>,
    audit: Arc<dyn AuditSink>,
    settings: CommitSettings,
}

impl OrderCommitProtocol {
    pub fn new(
        resolver: CatalogResolver,
        backend: Arc<dyn PosBackend>,
        audit: Arc<dyn AuditSink>,
        settings: CommitSettings,
    ) -> Self {
        Self { resolver, backend, audit, settings }
    }

    pub async fn commit(
        &self,
        request: &ResolvedOrderRequest,
        context: &CommitContext,
    ) -> Result<CommittedOrder, OrderError> {
        let mut order = self.create(request, context).await?;

        let lines = match self.resolve_lines(request, context).await {
            Ok(lines) => aggregate(&lines),
            Err(source) => {
                let failure = OrderError::Resolution { order_no: order.order_no.clone(), source };
                return Err(self.void(&mut order, context, failure).await);
            }
        };

        if let Err(failure) = self.add_lines(&order, &lines).await {
            return Err(self.void(&mut order, context, failure).await);
        }
        self.advance(&mut order, OrderStage::ItemsAdded, context).await?;

        if let Err(failure) = self.apply_discounts(&order, request, &lines).await {
            return Err(self.void(&mut order, context, failure).await);
        }
        self.advance(&mut order, OrderStage::DiscountsApplied, context).await?;

        let detail = match self.backend.fetch_order_detail(&order.id).await {
            Ok(detail) => detail,
            Err(source) => {
                let failure =
                    OrderError::PostCommitRead { order_no: order.order_no.clone(), source };
                return Err(self.void(&mut order, context, failure).await);
            }
        };

        let payment_recorded =
            request.payment_settled && self.settle(&order, request, &detail, context).await;
        let stage = if payment_recorded { OrderStage::Paid } else { OrderStage::UnpaidOpen };
        self.advance(&mut order, stage, context).await?;

        let receipt_url = match self.backend.receipt_url(&order.order_no, &request.phone) {
            Ok(url) => Some(url),
            Err(source) => {
                warn!(
                    event_name = "commit.receipt.unavailable",
                    order_no = %order.order_no,
                    error = %source,
                    "receipt link could not be built"
                );
                None
            }
        };

        self.audit.emit(
            AuditEvent::new(&context.correlation_id, "order.committed", AuditOutcome::Success)
                .for_order(&order.id, &order.order_no)
                .with_metadata("stage", order.stage.as_str())
                .with_metadata("lines", detail.lines.len().to_string())
                .with_metadata("total", detail.total_amount.to_string()),
        );
        info!(
            event_name = "commit.completed",
            correlation_id = %context.correlation_id,
            order_no = %order.order_no,
            stage = order.stage.as_str(),
            total = %detail.total_amount,
            "order committed"
        );

        Ok(CommittedOrder { order, detail, lines, payment_recorded, receipt_url })
    }

    async fn create(
        &self,
        request: &ResolvedOrderRequest,
        context: &CommitContext,
    ) -> Result<RemoteOrder, OrderError> {
        let customer = match self.backend.find_customer_by_phone(&request.phone).await {
            Ok(Some(customer_id)) => CustomerSpec::Existing { customer_id },
            Ok(None) => CustomerSpec::New {
                name: request.customer_name.clone(),
                phone: request.phone.clone(),
            },
            Err(source) => {
                warn!(
                    event_name = "commit.customer.lookup_failed",
                    correlation_id = %context.correlation_id,
                    error = %source,
                    "customer lookup failed; creating the order with raw customer details"
                );
                CustomerSpec::New { name: request.customer_name.clone(), phone: request.phone.clone() }
            }
        };

        let new_order = NewOrder {
            order_date: context.order_date,
            customer,
            notes: order_note(request, &context.notes_summary),
        };
        let created = match self.backend.create_order(&new_order).await {
            Ok(created) => created,
            Err(source) => {
                self.audit.emit(
                    AuditEvent::new(&context.correlation_id, "order.created", AuditOutcome::Failed)
                        .with_metadata("error", source.to_string()),
                );
                return Err(OrderError::OrderCreation { source });
            }
        };

        self.audit.emit(
            AuditEvent::new(&context.correlation_id, "order.created", AuditOutcome::Success)
                .for_order(&created.id, &created.order_no)
                .with_metadata("delivery_class", request.delivery_class.code()),
        );
        info!(
            event_name = "commit.order.created",
            correlation_id = %context.correlation_id,
            order_id = %created.id,
            order_no = %created.order_no,
            "remote order created"
        );
        Ok(RemoteOrder::created(created.id, created.order_no))
    }

    /// Requested lines plus the delivery fee, then the accessories that
    /// depend on the subtotal. The fee counts toward that subtotal.
    async fn resolve_lines(
        &self,
        request: &ResolvedOrderRequest,
        context: &CommitContext,
    ) -> Result<Vec<OrderLine>, ResolutionError> {
        let mut lines = Vec::new();
        for line in &request.lines {
            lines.extend(self.resolver.resolve(line).await?);
        }
        if let Some(fee) = self.settings.delivery.fee_line(&context.zone_text, context.distance_km) {
            lines.extend(self.resolver.resolve(&fee).await?);
        }
        let cart_total = subtotal(&lines);

        let mut accessories: Vec<LineRequest> = vec![self.settings.accessories.cup_line(cart_total)];
        accessories.extend(self.settings.accessories.merch_line(cart_total));
        for line in &accessories {
            lines.extend(self.resolver.resolve(line).await?);
        }
        Ok(lines)
    }

    async fn add_lines(&self, order: &RemoteOrder, lines: &[OrderLine]) -> Result<(), OrderError> {
        for (position, line) in lines.iter().enumerate() {
            if position > 0 {
                self.pause().await;
            }
            let outcome = match (&line.sku, &line.origin) {
                (SkuKey::Bundle { bundle_id }, LineOrigin::OpaqueBundle { components }) => {
                    self.backend.add_bundle(&order.id, bundle_id, line.quantity, components).await
                }
                (SkuKey::Bundle { bundle_id }, _) => {
                    self.backend.add_bundle(&order.id, bundle_id, line.quantity, &[]).await
                }
                (sku, _) => self.backend.add_item(&order.id, sku, line.quantity).await,
            };
            if let Err(source) = outcome {
                return Err(OrderError::LineCommit {
                    order_no: order.order_no.clone(),
                    product: line.name.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    async fn apply_discounts(
        &self,
        order: &RemoteOrder,
        request: &ResolvedOrderRequest,
        lines: &[OrderLine],
    ) -> Result<(), OrderError> {
        let order_no = order.order_no.clone();
        let has_proration = lines
            .iter()
            .any(|line| !line.discount.is_zero() && !matches!(line.sku, SkuKey::Bundle { .. }));

        if has_proration {
            let detail = self.read_rows(order).await?;
            let updates = discount::proration_updates(&detail, lines).map_err(|detail| {
                OrderError::DiscountComputation { order_no: order_no.clone(), detail }
            })?;
            self.push_updates(order, &updates).await?;
        }

        if request.discount.is_zero() {
            return Ok(());
        }
        let detail = self.read_rows(order).await?;
        let updates = discount::global_updates(&detail, &request.discount)
            .map_err(|detail| OrderError::DiscountComputation { order_no, detail })?;
        self.push_updates(order, &updates).await
    }

    async fn read_rows(&self, order: &RemoteOrder) -> Result<OrderDetail, OrderError> {
        self.pause().await;
        self.backend.fetch_order_detail(&order.id).await.map_err(|source| {
            OrderError::DiscountComputation {
                order_no: order.order_no.clone(),
                detail: format!("committed rows could not be read: {source}"),
            }
        })
    }

    async fn push_updates(&self, order: &RemoteOrder, updates: &[LineUpdate]) -> Result<(), OrderError> {
        for (applied, update) in updates.iter().enumerate() {
            self.pause().await;
            if let Err(source) = self.backend.update_line(&order.id, update).await {
                return Err(OrderError::DiscountPush {
                    order_no: order.order_no.clone(),
                    applied,
                    total: updates.len(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Records the payment and closes the order. Failures are logged and
    /// leave the order open.
    async fn settle(
        &self,
        order: &RemoteOrder,
        request: &ResolvedOrderRequest,
        detail: &OrderDetail,
        context: &CommitContext,
    ) -> bool {
        let outcome: Result<(), BackendError> = async {
            let modes = self.backend.list_payment_modes(&order.id).await?;
            let index = self.settings.payment_modes.index_of(request.payment_method);
            let mode = modes.get(index).ok_or_else(|| BackendError::Rejected {
                operation: "list_payment_modes".to_string(),
                message: format!("no payment mode at index {index}"),
            })?;
            self.pause().await;
            self.backend
                .record_payment(
                    &order.id,
                    &PaymentRecord {
                        mode_id: mode.id.clone(),
                        amount: detail.total_amount,
                        paid_on: context.order_date,
                    },
                )
                .await?;
            self.pause().await;
            self.backend.set_status(&order.id, RemoteOrderStatus::Finalized).await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.audit.emit(
                    AuditEvent::new(&context.correlation_id, "order.finalized", AuditOutcome::Success)
                        .for_order(&order.id, &order.order_no)
                        .with_metadata("payment_method", request.payment_method.label()),
                );
                true
            }
            Err(source) => {
                warn!(
                    event_name = "commit.payment.failed",
                    correlation_id = %context.correlation_id,
                    order_no = %order.order_no,
                    error = %source,
                    "payment could not be recorded; order left open"
                );
                self.audit.emit(
                    AuditEvent::new(&context.correlation_id, "order.finalized", AuditOutcome::Failed)
                        .for_order(&order.id, &order.order_no)
                        .with_metadata("error", source.to_string()),
                );
                false
            }
        }
    }

    async fn void(
        &self,
        order: &mut RemoteOrder,
        context: &CommitContext,
        failure: OrderError,
    ) -> OrderError {
        if let Err(source) = self.backend.set_status(&order.id, RemoteOrderStatus::Voided).await {
            error!(
                event_name = "commit.void.failed",
                correlation_id = %context.correlation_id,
                order_no = %order.order_no,
                error = %source,
                "order could not be voided after a failure"
            );
        }
        if let Err(transition) = order.transition_to(OrderStage::Voided) {
            error!(
                event_name = "commit.void.invalid_stage",
                order_no = %order.order_no,
                error = %transition,
                "void requested from a terminal stage"
            );
        }

        self.audit.emit(
            AuditEvent::new(&context.correlation_id, "order.voided", AuditOutcome::Rejected)
                .for_order(&order.id, &order.order_no)
                .with_metadata("error_kind", failure.kind().as_str())
                .with_metadata("error", failure.to_string()),
        );
        warn!(
            event_name = "commit.order.voided",
            correlation_id = %context.correlation_id,
            order_no = %order.order_no,
            error_kind = failure.kind().as_str(),
            error = %failure,
            "order voided"
        );
        failure
    }

    /// A rejected stage transition is a failure like any other: the order is
    /// voided before the error is returned.
    async fn advance(
        &self,
        order: &mut RemoteOrder,
        stage: OrderStage,
        context: &CommitContext,
    ) -> Result<(), OrderError> {
        match order.transition_to(stage) {
            Ok(()) => Ok(()),
            Err(transition) => Err(self.void(order, context, transition.into()).await),
        }
    }

    async fn pause(&self) {
        if !self.settings.request_delay.is_zero() {
            tokio::time::sleep(self.settings.request_delay).await;
        }
    }
}

/// Order note: delivery class code, then the summarized notes when present.
pub fn order_note(request: &ResolvedOrderRequest, summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        format!("[{}]", request.delivery_class.code())
    } else {
        format!("[{}] {summary}", request.delivery_class.code())
    }
}

/// Reply text for a failed order, prefixed with the customer it belongs to.
pub fn failure_reply(request: &ResolvedOrderRequest, failure: &OrderError) -> String {
    format!(
        "Order for {} ({}) failed.\n{}",
        request.customer_name,
        request.phone,
        failure.user_message()
    )
}

#[cfg(test)]
mod tests;
