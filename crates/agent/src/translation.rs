//! Parsing of the translator model's JSON into a typed outcome.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use kasir_core::domain::request::{
    DelayCondition, DeliveryClass, DiscountMode, DiscountSpec, LineKind, LineRequest,
    MessageMarkers, PaymentMethod, ResolvedOrderRequest,
};
use kasir_core::ports::{OrderTranslator, TranslationError, TranslatorOutcome};

use crate::llm::LlmClient;
use crate::prompts;

const NO_CANCEL_NUMBER: &str = "No order number was given to cancel.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProduct {
    #[serde(alias = "tipe", alias = "type")]
    kind: String,
    #[serde(alias = "produk", alias = "product")]
    name: String,
    #[serde(alias = "qty")]
    quantity: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTranslation {
    fallback: Option<String>,
    #[serde(alias = "pembatalan")]
    cancel: Option<Value>,
    #[serde(alias = "kosongkan_keranjang")]
    clear_open_orders: Option<Value>,
    #[serde(alias = "cust_name")]
    customer_name: Option<String>,
    #[serde(alias = "phone_num")]
    phone: Option<Value>,
    #[serde(alias = "ordered_products")]
    products: Option<Vec<RawProduct>>,
    address: Option<String>,
    #[serde(alias = "payment_type")]
    payment: Option<String>,
    payment_settled: Option<bool>,
    status: Option<String>,
    #[serde(alias = "mode_diskon")]
    discount_mode: Option<String>,
    /// Percent points or currency, depending on the mode.
    discount: Option<Value>,
    /// Older schema: a fraction (0.1 = 10%) in percentage mode.
    disc: Option<Value>,
    notes: Option<String>,
    #[serde(alias = "jenis_pengiriman")]
    delivery: Option<String>,
    delay_conditions: Option<Vec<String>>,
    tambahan_waktu: Option<Value>,
}

/// Removes a surrounding Markdown code fence.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim().trim_end_matches("```").trim()
}

/// Repairs the two slips the model makes most: Python literals and
/// trailing commas. String contents are left alone.
pub fn repair_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut repaired = String::with_capacity(text.len());
    let mut in_string = false;
    let mut index = 0;
    while index < chars.len() {
        let current = chars[index];
        if in_string {
            repaired.push(current);
            if current == '\\' {
                if let Some(next) = chars.get(index + 1) {
                    repaired.push(*next);
                    index += 1;
                }
            } else if current == '"' {
                in_string = false;
            }
            index += 1;
            continue;
        }
        match current {
            '"' => {
                in_string = true;
                repaired.push(current);
            }
            ',' => {
                let next = chars[index + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    repaired.push(current);
                }
            }
            _ => {
                let rest: String = chars[index..].iter().take(5).collect();
                let boundary = index == 0 || !chars[index - 1].is_alphanumeric();
                if boundary && rest.starts_with("True") {
                    repaired.push_str("true");
                    index += 4;
                    continue;
                }
                if boundary && rest.starts_with("False") {
                    repaired.push_str("false");
                    index += 5;
                    continue;
                }
                if boundary && rest.starts_with("None") {
                    repaired.push_str("null");
                    index += 4;
                    continue;
                }
                repaired.push(current);
            }
        }
        index += 1;
    }
    repaired
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Amounts such as `10`, `"10%"`, `"5k"` or `"0.1"`.
fn amount_of(value: &Value) -> Decimal {
    match value {
        Value::Number(number) => number.to_string().parse().unwrap_or_default(),
        Value::String(raw) => {
            let cleaned = raw.trim().trim_end_matches('%').trim().to_ascii_lowercase();
            match cleaned.strip_suffix('k') {
                Some(thousands) => thousands.trim().parse::<Decimal>().map(|v| v * Decimal::from(1000)).unwrap_or_default(),
                None => cleaned.parse().unwrap_or_default(),
            }
        }
        _ => Decimal::ZERO,
    }
}

fn quantity_of(value: &Value) -> u32 {
    match value {
        Value::Null => 1,
        other => amount_of(other).trunc().to_u32().unwrap_or(0),
    }
}

/// Keeps digits and a leading `+`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut phone: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        phone.insert(0, '+');
    }
    phone
}

/// Splits `"SO-1, SO-2"` and `["SO-1", "SO-2,SO-3"]` alike.
pub fn cancel_ids(value: &Value) -> Vec<String> {
    let joined = match value {
        Value::Array(entries) => entries.iter().filter_map(text_of).collect::<Vec<_>>().join(","),
        other => text_of(other).unwrap_or_default(),
    };
    joined.split(',').map(str::trim).filter(|id| !id.is_empty()).map(str::to_string).collect()
}

fn discount(raw: &RawTranslation) -> DiscountSpec {
    let mode = match raw.discount_mode.as_deref().map(|mode| mode.trim().to_ascii_lowercase()) {
        Some(mode) if mode == "number" || mode == "fixed" => DiscountMode::Fixed,
        _ => DiscountMode::Percentage,
    };
    let value = match (&raw.discount, &raw.disc) {
        (Some(points), _) => amount_of(points),
        (None, Some(legacy)) => {
            let value = amount_of(legacy);
            let is_fraction = value > Decimal::ZERO && value <= Decimal::ONE;
            if mode == DiscountMode::Percentage && is_fraction {
                value * Decimal::ONE_HUNDRED
            } else {
                value
            }
        }
        (None, None) => Decimal::ZERO,
    };
    DiscountSpec { mode, value: value.max(Decimal::ZERO).normalize() }
}

/// Legacy messages carry only the total extra minutes. The notes name the
/// conditions; otherwise the minutes are split over the condition table.
fn legacy_delays(minutes: i64, notes: &str) -> Vec<DelayCondition> {
    let mentioned: Vec<DelayCondition> = notes
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter_map(DelayCondition::parse)
        .collect();
    let mentioned_total: i64 = mentioned.iter().map(|condition| condition.minutes()).sum();
    if mentioned_total == minutes {
        return mentioned;
    }

    let mut remaining = minutes;
    let mut split = Vec::new();
    for condition in [DelayCondition::NoExpedition, DelayCondition::Backlog, DelayCondition::Traffic] {
        while remaining >= condition.minutes() {
            split.push(condition);
            remaining -= condition.minutes();
        }
    }
    split
}

fn delays(raw: &RawTranslation, notes: &str) -> Vec<DelayCondition> {
    if let Some(conditions) = raw.delay_conditions.as_ref().filter(|conditions| !conditions.is_empty()) {
        return conditions.iter().filter_map(|name| DelayCondition::parse(name)).collect();
    }
    let minutes = raw.tambahan_waktu.as_ref().map(amount_of).unwrap_or_default().trunc().to_i64().unwrap_or(0);
    if minutes > 0 {
        legacy_delays(minutes, notes)
    } else {
        Vec::new()
    }
}

fn line(product: &RawProduct) -> Option<LineRequest> {
    let name = product.name.trim();
    if name.is_empty() {
        return None;
    }
    let kind = match product.kind.trim().to_ascii_lowercase().as_str() {
        "paket" | "bundle" | "package" => LineKind::Bundle,
        _ => LineKind::Item,
    };
    Some(LineRequest { kind, name: name.to_string(), quantity: quantity_of(&product.quantity) })
}

/// Decodes the translator's reply. `raw_message` is the original chat text,
/// scanned for markers the model is not asked about.
pub fn parse_translation(reply: &str, raw_message: &str) -> Result<TranslatorOutcome, TranslationError> {
    let repaired = repair_json(strip_fences(reply));
    let raw: RawTranslation = serde_json::from_str(&repaired)
        .map_err(|error| TranslationError::Malformed(error.to_string()))?;

    if let Some(message) = raw.fallback.as_deref().map(str::trim).filter(|message| !message.is_empty()) {
        return Ok(TranslatorOutcome::Fallback(message.to_string()));
    }
    let products = raw.products.as_deref().unwrap_or_default();
    if let Some(cancel) = &raw.cancel {
        let ids = cancel_ids(cancel);
        if !ids.is_empty() {
            return Ok(TranslatorOutcome::Cancel(ids));
        }
        if products.is_empty() {
            return Ok(TranslatorOutcome::Fallback(NO_CANCEL_NUMBER.to_string()));
        }
    }
    if raw.clear_open_orders.as_ref().is_some_and(truthy) {
        return Ok(TranslatorOutcome::ClearOpenOrders);
    }

    let notes = raw.notes.clone().unwrap_or_default().trim().to_string();
    let payment_settled = raw.payment_settled.unwrap_or(false)
        || raw.status.as_deref().is_some_and(|status| status.trim().eq_ignore_ascii_case("lunas"));
    let request = ResolvedOrderRequest {
        customer_name: raw.customer_name.clone().unwrap_or_default().trim().to_string(),
        phone: raw.phone.as_ref().and_then(text_of).map(|phone| normalize_phone(&phone)).unwrap_or_default(),
        address: raw.address.clone().unwrap_or_default().trim().to_string(),
        payment_method: PaymentMethod::parse_lenient(raw.payment.as_deref().unwrap_or_default()),
        payment_settled,
        discount: discount(&raw),
        lines: products.iter().filter_map(line).collect(),
        delivery_class: raw
            .delivery
            .as_deref()
            .and_then(DeliveryClass::from_code)
            .unwrap_or(DeliveryClass::Standard),
        delay_conditions: delays(&raw, &notes),
        notes,
        markers: MessageMarkers::scan(raw_message),
    };
    Ok(TranslatorOutcome::Order(Box::new(request)))
}

/// `OrderTranslator` backed by an LLM.
pub struct LlmTranslator {
    llm: Arc<dyn LlmClient>,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl OrderTranslator for LlmTranslator {
    async fn translate(&self, raw_text: &str) -> Result<TranslatorOutcome, TranslationError> {
        let reply = self
            .llm
            .complete(prompts::TRANSLATOR, raw_text)
            .await
            .map_err(|error| TranslationError::Upstream(format!("{error:#}")))?;
        debug!(event_name = "agent.translation.reply", chars = reply.len(), "translator replied");
        let outcome = parse_translation(&reply, raw_text);
        if let Err(error) = &outcome {
            warn!(event_name = "agent.translation.malformed", error = %error, "translator reply could not be parsed");
        }
        outcome
    }
}
