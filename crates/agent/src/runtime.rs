//! One chat message in, one reply out.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use kasir_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use kasir_core::commit::admin::OrderAdmin;
use kasir_core::commit::{failure_reply, CommitContext, OrderCommitProtocol};
use kasir_core::domain::request::{LineKind, ResolvedOrderRequest};
use kasir_core::errors::OrderError;
use kasir_core::invoice::{InvoiceInput, InvoiceRenderer};
use kasir_core::ports::{
    GeoPoint, Geocoder, NotesSummarizer, OrderTranslator, ResolvedAddress, RouteEstimate,
    TranslatorOutcome,
};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};

/// What goes back to the chat, plus the flags the relay routes on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderReply {
    pub text: String,
    pub completed: bool,
    pub pending: bool,
    pub request_update: bool,
    pub order_no: Option<String>,
}

impl OrderReply {
    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub store: GeoPoint,
    pub max_distance_km: f64,
    pub utc_offset: FixedOffset,
}

pub struct AgentRuntime {
    translator: Arc<dyn OrderTranslator>,
    geocoder: Arc<dyn Geocoder>,
    summarizer: Arc<dyn NotesSummarizer>,
    protocol: OrderCommitProtocol,
    admin: OrderAdmin,
    invoice: InvoiceRenderer,
    audit: Arc<dyn AuditSink>,
    guardrails: GuardrailPolicy,
    settings: RuntimeSettings,
}

struct Located {
    address: ResolvedAddress,
    route: RouteEstimate,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        translator: Arc<dyn OrderTranslator>,
        geocoder: Arc<dyn Geocoder>,
        summarizer: Arc<dyn NotesSummarizer>,
        protocol: OrderCommitProtocol,
        admin: OrderAdmin,
        invoice: InvoiceRenderer,
        audit: Arc<dyn AuditSink>,
        guardrails: GuardrailPolicy,
        settings: RuntimeSettings,
    ) -> Self {
        Self { translator, geocoder, summarizer, protocol, admin, invoice, audit, guardrails, settings }
    }

    pub async fn handle_order_message(&self, text: &str) -> OrderReply {
        self.handle_order_message_at(text, Utc::now()).await
    }

    pub async fn handle_order_message_at(&self, text: &str, now: DateTime<Utc>) -> OrderReply {
        let correlation_id = Uuid::new_v4().to_string();
        let now = now.with_timezone(&self.settings.utc_offset);

        let outcome = match self.translator.translate(text).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(event_name = "agent.message.untranslated", %correlation_id, error = %error, "message could not be translated");
                return OrderReply::plain(OrderError::Translation { detail: error.to_string() }.user_message());
            }
        };

        match outcome {
            TranslatorOutcome::Fallback(message) => OrderReply::plain(message),
            TranslatorOutcome::Cancel(order_numbers) => {
                let report = self.admin.cancel_by_numbers(&order_numbers, &correlation_id).await;
                OrderReply::plain(report.message())
            }
            TranslatorOutcome::ClearOpenOrders => {
                match self.admin.cancel_all_open(now.date_naive(), &correlation_id).await {
                    Ok(report) => OrderReply::plain(report.message()),
                    Err(error) => OrderReply::plain(format!("Open orders could not be listed: {error}")),
                }
            }
            TranslatorOutcome::Order(request) => self.place(&request, &correlation_id, now).await,
        }
    }

    async fn place(&self, request: &ResolvedOrderRequest, correlation_id: &str, now: DateTime<FixedOffset>) -> OrderReply {
        let mut reply = OrderReply {
            pending: request.markers.pending,
            request_update: request.markers.request_update,
            ..OrderReply::default()
        };

        if let GuardrailDecision::Deny { reason_code, user_message } = self.guardrails.evaluate(request) {
            self.audit.emit(
                AuditEvent::new(correlation_id, "order.rejected", AuditOutcome::Rejected)
                    .with_metadata("reason", reason_code),
            );
            reply.text = user_message;
            return reply;
        }

        let located = match self.locate(request).await {
            Ok(located) => located,
            Err(failure) => {
                self.audit.emit(
                    AuditEvent::new(correlation_id, "order.rejected", AuditOutcome::Rejected)
                        .with_metadata("reason", failure.kind().as_str()),
                );
                reply.text = failure_reply(request, &failure);
                return reply;
            }
        };
        let distance_km = located.route.distance_km();

        let notes_summary = self.summarizer.summarize(&summary_input(request)).await;
        let context = CommitContext {
            correlation_id: correlation_id.to_string(),
            order_date: now.date_naive(),
            zone_text: format!("{} {}", request.address, located.address.formatted),
            distance_km,
            notes_summary,
        };

        let committed = match self.protocol.commit(request, &context).await {
            Ok(committed) => committed,
            Err(failure) => {
                reply.text = failure_reply(request, &failure);
                return reply;
            }
        };

        reply.order_no = Some(committed.order.order_no.clone());
        reply.completed = true;
        let rendered = self.invoice.render(&InvoiceInput {
            request,
            detail: &committed.detail,
            receipt_url: committed.receipt_url.as_deref(),
            distance_km,
            route_duration_seconds: located.route.duration_seconds,
            village: located.address.village.as_deref(),
            district: located.address.district.as_deref(),
            now,
        });
        reply.text = match rendered {
            Ok(text) => text,
            Err(error) => {
                warn!(event_name = "agent.invoice.failed", correlation_id, error = %error, "invoice could not be rendered");
                format!("Order {} was saved but the invoice could not be rendered.", committed.order.order_no)
            }
        };
        info!(
            event_name = "agent.order.completed",
            correlation_id,
            order_no = %committed.order.order_no,
            distance_km,
            "order committed"
        );
        reply
    }

    /// Geocodes the address and routes to it from the store; too-far
    /// addresses are refused before any order exists.
    async fn locate(&self, request: &ResolvedOrderRequest) -> Result<Located, OrderError> {
        let address = self
            .geocoder
            .resolve(&request.address)
            .await
            .map_err(|error| OrderError::AddressResolution { detail: error.to_string() })?;
        let route = self
            .geocoder
            .route(self.settings.store, address.point)
            .await
            .map_err(|error| OrderError::AddressResolution { detail: error.to_string() })?;
        let distance_km = route.distance_km();
        if distance_km > self.settings.max_distance_km {
            return Err(OrderError::DistanceRejected { distance_km, max_km: self.settings.max_distance_km });
        }
        Ok(Located { address, route })
    }
}

/// Bundle names and notes, the material for the thank-you line.
fn summary_input(request: &ResolvedOrderRequest) -> String {
    let bundles: Vec<&str> = request
        .lines
        .iter()
        .filter(|line| line.kind == LineKind::Bundle)
        .map(|line| line.name.as_str())
        .collect();
    let notes = request.notes.trim();
    match (bundles.is_empty(), notes.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("Notes: {notes}"),
        (false, true) => format!("Bundles: {}", bundles.join(", ")),
        (false, false) => format!("Bundles: {}\nNotes: {notes}", bundles.join(", ")),
    }
}
