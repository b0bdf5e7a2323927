//! Customer-facing confirmation text for a committed order.

use chrono::{DateTime, Duration, FixedOffset};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::request::{DeliveryClass, ResolvedOrderRequest};
use crate::policy::EtaPolicy;
use crate::ports::OrderDetail;

const TEMPLATE_NAME: &str = "invoice.txt";
pub const RECEIPT_PLACEHOLDER: &str = "Failed to print receipt. Please retry.";
const NO_NOTES: &str = "No additional notes.";

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invoice template error: {0}")]
    Template(String),
}

/// Everything the invoice shows, gathered after the order is committed.
#[derive(Clone, Debug)]
pub struct InvoiceInput<'a> {
    pub request: &'a ResolvedOrderRequest,
    pub detail: &'a OrderDetail,
    pub receipt_url: Option<&'a str>,
    pub distance_km: f64,
    pub route_duration_seconds: f64,
    pub village: Option<&'a str>,
    pub district: Option<&'a str>,
    pub now: DateTime<FixedOffset>,
}

#[derive(Serialize)]
struct InvoiceView {
    markers: Vec<&'static str>,
    has_markers: bool,
    name: String,
    phone: String,
    address: String,
    timing_label: &'static str,
    timing: String,
    distance: String,
    area: Option<String>,
    total: String,
    payment: String,
    receipt: String,
    ordered_at: String,
    delivery: &'static str,
    notes: String,
}

pub struct InvoiceRenderer {
    tera: Tera,
    eta: EtaPolicy,
}

impl InvoiceRenderer {
    pub fn new(eta: EtaPolicy) -> Result<Self, InvoiceError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../../../templates/invoice.txt.tera"))
            .map_err(|error| InvoiceError::Template(error.to_string()))?;
        Ok(Self { tera, eta })
    }

    pub fn render(&self, input: &InvoiceInput<'_>) -> Result<String, InvoiceError> {
        let request = input.request;
        let mut markers = Vec::new();
        if request.markers.pending {
            markers.push("*[PENDING ORDER]*");
        }
        if request.markers.update_receipt {
            markers.push("*[UPDATE RECEIPT]*");
        }
        if request.markers.request_update {
            markers.push("*[REQUEST UPDATE RECEIPT]*");
        }

        let (timing_label, timing) = delivery_timing(
            &self.eta,
            request.delivery_class,
            input.distance_km,
            request.delay_minutes(),
            input.route_duration_seconds,
            input.now,
        );

        let total = if input.detail.formatted_total.trim().is_empty() {
            input.detail.total_amount.round_dp(0).to_string()
        } else {
            input.detail.formatted_total.clone()
        };
        let notes = request.notes.trim();

        let view = InvoiceView {
            has_markers: !markers.is_empty(),
            markers,
            name: request.customer_name.clone(),
            phone: request.phone.clone(),
            address: request.address.clone(),
            timing_label,
            timing: timing.format("%H:%M").to_string(),
            distance: format_distance(input.distance_km),
            area: area_label(input.village, input.district),
            total,
            payment: request.payment_method.label().to_string(),
            receipt: input.receipt_url.unwrap_or(RECEIPT_PLACEHOLDER).to_string(),
            ordered_at: input.now.format("%H:%M").to_string(),
            delivery: request.delivery_class.label(),
            notes: if notes.is_empty() { NO_NOTES.to_string() } else { notes.to_string() },
        };

        let context = Context::from_serialize(&view)
            .map_err(|error| InvoiceError::Template(error.to_string()))?;
        let rendered = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|error| InvoiceError::Template(error.to_string()))?;
        Ok(rendered.trim_end().to_string())
    }
}

/// Standard orders show the latest dispatch time; instant and express show
/// the estimated arrival, including delay conditions.
pub fn delivery_timing(
    eta: &EtaPolicy,
    class: DeliveryClass,
    distance_km: f64,
    delay_minutes: i64,
    route_duration_seconds: f64,
    now: DateTime<FixedOffset>,
) -> (&'static str, DateTime<FixedOffset>) {
    let label = match class {
        DeliveryClass::Standard => "MAX DISPATCH FROM WAREHOUSE",
        DeliveryClass::Instant | DeliveryClass::Express => "ESTIMATED ARRIVAL",
    };

    let minutes = match (class, eta.travel_minutes(class, distance_km)) {
        (DeliveryClass::Standard, Some(minutes)) => minutes,
        (_, Some(minutes)) => minutes + delay_minutes + eta.handover_minutes,
        (_, None) => {
            let route_minutes = if route_duration_seconds.is_finite() && route_duration_seconds > 0.0 {
                (route_duration_seconds / 60.0) as i64
            } else {
                0
            };
            route_minutes + eta.fallback_margin_minutes
        }
    };

    (label, now + Duration::minutes(minutes))
}

/// Whole kilometres above 14 km, one decimal at or below.
pub fn format_distance(distance_km: f64) -> String {
    if distance_km > 14.0 {
        format!("{distance_km:.0}")
    } else {
        format!("{distance_km:.1}")
    }
}

fn clean_district(district: &str) -> String {
    let mut cleaned = district.trim();
    for prefix in ["Kecamatan ", "Kec. ", "kecamatan ", "kec. "] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim();
        }
    }
    cleaned.to_string()
}

fn area_label(village: Option<&str>, district: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [
        village.map(|village| village.trim().to_string()),
        district.map(clean_district),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, TimeZone};
    use rust_decimal::Decimal;

    use crate::domain::order::RemoteOrderId;
    use crate::domain::request::{
        DelayCondition, DeliveryClass, DiscountSpec, MessageMarkers, PaymentMethod,
        ResolvedOrderRequest,
    };
    use crate::policy::EtaPolicy;
    use crate::ports::OrderDetail;

    use super::{format_distance, InvoiceInput, InvoiceRenderer, RECEIPT_PLACEHOLDER};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .and_then(|offset| offset.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).single())
            .expect("valid timestamp")
    }

    fn request(class: DeliveryClass) -> ResolvedOrderRequest {
        ResolvedOrderRequest {
            customer_name: "Rina".to_string(),
            phone: "+6281234567890".to_string(),
            address: "Jl. Kusumodilagan 12".to_string(),
            payment_method: PaymentMethod::Qris,
            payment_settled: true,
            discount: DiscountSpec::none(),
            lines: Vec::new(),
            notes: String::new(),
            delivery_class: class,
            delay_conditions: Vec::new(),
            markers: MessageMarkers::default(),
        }
    }

    fn detail() -> OrderDetail {
        OrderDetail {
            id: RemoteOrderId("1".to_string()),
            order_no: "SO-1".to_string(),
            total_amount: Decimal::new(95_000, 0),
            formatted_total: "Rp 95.000".to_string(),
            lines: Vec::new(),
        }
    }

    fn render(request: &ResolvedOrderRequest, distance_km: f64, receipt: Option<&str>) -> String {
        let detail = detail();
        let renderer = InvoiceRenderer::new(EtaPolicy::default()).expect("template");
        renderer
            .render(&InvoiceInput {
                request,
                detail: &detail,
                receipt_url: receipt,
                distance_km,
                route_duration_seconds: 900.0,
                village: Some("Jebres"),
                district: Some("Kecamatan Jebres"),
                now: now(),
            })
            .expect("render")
    }

    #[test]
    fn standard_invoice_shows_dispatch_deadline() {
        let invoice = render(&request(DeliveryClass::Standard), 3.24, Some("https://r.test/SO-1"));

        assert!(invoice.starts_with("Name: Rina"));
        assert!(invoice.contains("MAX DISPATCH FROM WAREHOUSE: 20:30"));
        assert!(invoice.contains("Distance: 3.2 km (*Jebres, Jebres*)"));
        assert!(invoice.contains("Total: Rp 95.000 (*QRIS*)"));
        assert!(invoice.contains("Check your order here: https://r.test/SO-1"));
        assert!(invoice.contains("Order time: *19:30*"));
        assert!(invoice.contains("Delivery: Standard Delivery"));
        assert!(invoice.ends_with("*NOTES: No additional notes.*"));
    }

    #[test]
    fn instant_invoice_adds_delays_to_the_arrival_estimate() {
        let mut order = request(DeliveryClass::Instant);
        order.delay_conditions = vec![DelayCondition::Rain, DelayCondition::Backlog];

        let invoice = render(&order, 10.0, None);

        // 10 prep + 24 riding + 15 delay + 3 handover
        assert!(invoice.contains("ESTIMATED ARRIVAL: 20:22"));
        assert!(invoice.contains(RECEIPT_PLACEHOLDER));
    }

    #[test]
    fn markers_lead_the_invoice() {
        let mut order = request(DeliveryClass::Standard);
        order.markers = MessageMarkers { pending: true, update_receipt: false, request_update: true };
        order.notes = "Leave at the gate".to_string();

        let invoice = render(&order, 20.0, None);

        assert!(invoice.starts_with("*[PENDING ORDER]*\n*[REQUEST UPDATE RECEIPT]*\n\nName: Rina"));
        assert!(invoice.contains("*NOTES: Leave at the gate*"));
    }

    #[test]
    fn long_distances_are_shown_in_whole_kilometres() {
        assert_eq!(format_distance(14.0), "14.0");
        assert_eq!(format_distance(14.6), "15");
        assert_eq!(format_distance(3.24), "3.2");
    }
}
