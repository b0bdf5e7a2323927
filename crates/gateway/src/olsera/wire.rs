//! Decoding of the POS backend's JSON payloads. Numbers arrive as JSON
//! numbers, plain strings, or dotted display strings, so every field is read
//! leniently.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use kasir_core::domain::catalog::{
    BundleCategory, BundleComponent, BundleId, CatalogBundle, CatalogItem, ItemId, Variant,
    VariantId,
};
use kasir_core::domain::order::{RemoteOrderId, RemoteOrderStatus, SkuKey};
use kasir_core::ports::{
    CatalogKind, CatalogPage, CreatedOrder, OrderDetail, OrderDetailLine, OrderSummary,
    PaymentMode,
};

pub fn status_code(status: RemoteOrderStatus) -> &'static str {
    match status {
        RemoteOrderStatus::Open => "A",
        RemoteOrderStatus::Voided => "X",
        RemoteOrderStatus::Finalized => "Z",
    }
}

fn text(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(raw) => raw.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Identifier fields where `0` means "absent".
fn reference(value: &Value) -> Option<String> {
    text(value).filter(|raw| raw != "0")
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_f64().and_then(Decimal::from_f64))
            .unwrap_or_default(),
        Value::String(raw) => raw.trim().parse::<Decimal>().unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Display amounts such as `95.000` use dots as thousands separators.
fn display_amount(value: &Value) -> Option<Decimal> {
    let raw = value.as_str()?.trim();
    let whole = raw.split(',').next().unwrap_or_default().replace('.', "");
    whole.parse::<Decimal>().ok()
}

fn integer(value: &Value) -> i64 {
    match value {
        Value::Number(number) => {
            number.as_i64().or_else(|| number.as_f64().map(|float| float as i64)).unwrap_or(0)
        }
        Value::String(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| raw.trim().parse::<f64>().ok().map(|float| float as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn quantity(value: &Value) -> u32 {
    u32::try_from(integer(value).max(0)).unwrap_or(u32::MAX)
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        other => integer(other) != 0,
    }
}

fn data(payload: &Value) -> &Value {
    payload.get("data").unwrap_or(&Value::Null)
}

fn rows(value: &Value) -> &[Value] {
    match value {
        Value::Array(rows) => rows,
        Value::Object(_) => match value.get("data") {
            Some(Value::Array(rows)) => rows,
            _ => &[],
        },
        _ => &[],
    }
}

/// Some failures come back as a 2xx body with an `error` object.
pub fn embedded_error(payload: &Value) -> Option<(u16, String)> {
    let error = payload.get("error")?;
    if error.is_null() {
        return None;
    }
    let status = u16::try_from(integer(error.get("status_code").unwrap_or(&Value::Null))).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(text)
        .unwrap_or_else(|| error.to_string());
    Some((status, message))
}

pub fn customer_id(payload: &Value) -> Option<String> {
    rows(data(payload)).first().and_then(|row| row.get("id")).and_then(reference)
}

pub fn created_order(payload: &Value) -> Result<CreatedOrder, String> {
    let body = data(payload);
    let id = body.get("id").and_then(reference).ok_or("response carries no order id")?;
    let order_no = body.get("order_no").and_then(text).ok_or("response carries no order number")?;
    Ok(CreatedOrder { id: RemoteOrderId(id), order_no })
}

fn row_sku(row: &Value) -> Option<SkuKey> {
    if let Some(combo) = row.get("product_combo_id").and_then(reference) {
        return Some(SkuKey::bundle(BundleId(combo)));
    }
    let item = row.get("product_id").and_then(reference)?;
    match row.get("product_variant_id").and_then(reference) {
        Some(variant) => Some(SkuKey::variant(ItemId(item), VariantId(variant))),
        None => Some(SkuKey::item(ItemId(item))),
    }
}

pub fn order_detail(payload: &Value) -> Result<OrderDetail, String> {
    let body = data(payload);
    let id = body.get("id").and_then(reference).ok_or("order detail carries no id")?;
    let order_no = body.get("order_no").and_then(text).unwrap_or_default();

    let mut lines = Vec::new();
    for row in rows(body.get("orderitems").unwrap_or(&Value::Null)) {
        let line_id = row.get("id").and_then(reference).ok_or("order row carries no id")?;
        let quantity = quantity(row.get("qty").unwrap_or(&Value::Null));
        let price = row
            .get("price")
            .map(decimal)
            .filter(|price| !price.is_zero())
            .or_else(|| row.get("fprice").and_then(display_amount))
            .unwrap_or_default();
        lines.push(OrderDetailLine {
            line_id,
            sku: row_sku(row),
            name: row.get("product_name").and_then(text).unwrap_or_default(),
            quantity,
            price,
            amount: decimal(row.get("amount").unwrap_or(&Value::Null)),
            discount: decimal(row.get("discount").unwrap_or(&Value::Null)),
        });
    }

    Ok(OrderDetail {
        id: RemoteOrderId(id),
        order_no,
        total_amount: decimal(body.get("total_amount").unwrap_or(&Value::Null)),
        formatted_total: body.get("ftotal_amount").and_then(text).unwrap_or_default(),
        lines,
    })
}

fn variant(row: &Value) -> Option<Variant> {
    Some(Variant {
        id: VariantId(row.get("id").and_then(reference)?),
        name: row.get("name").and_then(text).unwrap_or_default(),
        price: decimal(row.get("sell_price_pos").unwrap_or(&Value::Null)),
        stock: integer(row.get("stock_qty").unwrap_or(&Value::Null)),
        held: integer(row.get("hold_qty").unwrap_or(&Value::Null)),
    })
}

/// Accepts both listing rows and the `data` object of an item detail.
pub fn item(row: &Value) -> Result<CatalogItem, String> {
    let id = row.get("id").and_then(reference).ok_or("item carries no id")?;
    let variants = match row.get("variant") {
        Some(Value::Array(variants)) => variants.iter().filter_map(variant).collect(),
        _ => Vec::new(),
    };
    Ok(CatalogItem {
        id: ItemId(id),
        name: row.get("name").and_then(text).unwrap_or_default(),
        price: decimal(row.get("sell_price_pos").unwrap_or(&Value::Null)),
        variants,
        hidden: flag(row.get("pos_hidden").unwrap_or(&Value::Null)),
    })
}

fn component(row: &Value) -> Option<BundleComponent> {
    Some(BundleComponent {
        row_id: row.get("id").and_then(reference),
        item_id: ItemId(row.get("product_id").and_then(reference)?),
        variant_id: row.get("product_variant_id").and_then(reference).map(VariantId),
        quantity: quantity(row.get("qty").unwrap_or(&Value::Null)).max(1),
    })
}

/// Accepts both listing rows and the `data` object of a bundle detail.
pub fn bundle(row: &Value) -> Result<CatalogBundle, String> {
    let id = row.get("id").and_then(reference).ok_or("bundle carries no id")?;
    let components =
        rows(row.get("items").unwrap_or(&Value::Null)).iter().filter_map(component).collect();
    Ok(CatalogBundle {
        id: BundleId(id),
        name: row.get("name").and_then(text).unwrap_or_default(),
        price: decimal(row.get("sell_price_pos").unwrap_or(&Value::Null)),
        components,
        hidden: flag(row.get("pos_hidden").unwrap_or(&Value::Null)),
        category: BundleCategory::default(),
    })
}

pub fn detail_body(payload: &Value) -> &Value {
    data(payload)
}

pub fn payment_modes(payload: &Value) -> Result<Vec<PaymentMode>, String> {
    let modes = data(payload)
        .get("payment_modes")
        .and_then(Value::as_array)
        .ok_or("response carries no payment modes")?;
    Ok(modes
        .iter()
        .filter_map(|mode| {
            Some(PaymentMode {
                id: mode.get("id").and_then(reference)?,
                name: mode.get("name").and_then(text).unwrap_or_default(),
            })
        })
        .collect())
}

pub fn order_summaries(payload: &Value) -> Vec<OrderSummary> {
    rows(data(payload))
        .iter()
        .filter_map(|row| {
            Some(OrderSummary {
                id: RemoteOrderId(row.get("id").and_then(reference)?),
                order_no: row.get("order_no").and_then(text).unwrap_or_default(),
            })
        })
        .collect()
}

pub fn catalog_page(kind: CatalogKind, payload: &Value) -> CatalogPage {
    let entries = rows(data(payload));
    let mut page = CatalogPage {
        last_page: payload
            .get("meta")
            .and_then(|meta| meta.get("last_page"))
            .map(integer)
            .and_then(|last| u32::try_from(last).ok())
            .unwrap_or(0),
        ..CatalogPage::default()
    };
    match kind {
        CatalogKind::Items => page.items = entries.iter().filter_map(|row| item(row).ok()).collect(),
        CatalogKind::Bundles => {
            page.bundles = entries.iter().filter_map(|row| bundle(row).ok()).collect()
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use kasir_core::domain::catalog::{BundleId, ItemId, VariantId};
    use kasir_core::domain::order::SkuKey;
    use kasir_core::ports::CatalogKind;

    use super::{bundle, catalog_page, embedded_error, item, order_detail, payment_modes};

    #[test]
    fn order_rows_carry_sku_keys_and_display_prices() {
        let payload = json!({
            "data": {
                "id": 9001,
                "order_no": "SO-1",
                "total_amount": "135000.00",
                "ftotal_amount": "Rp 135.000",
                "orderitems": [
                    {"id": 1, "product_id": 10, "product_variant_id": 11, "product_name": "Gin",
                     "qty": "1", "fprice": "95.000", "amount": "95000", "discount": "0"},
                    {"id": 2, "product_id": "20", "product_variant_id": null, "product_name": "Tonic",
                     "qty": 2, "fprice": "20.000", "amount": 40000, "discount": 0},
                    {"id": 3, "product_id": 0, "product_combo_id": 77, "product_name": "Paket",
                     "qty": 1, "fprice": "0", "amount": 0, "discount": 0}
                ]
            }
        });

        let detail = order_detail(&payload).expect("detail");
        assert_eq!(detail.id.0, "9001");
        assert_eq!(detail.total_amount, Decimal::new(135_000, 0));
        assert_eq!(detail.formatted_total, "Rp 135.000");
        assert_eq!(
            detail.lines[0].sku,
            Some(SkuKey::variant(ItemId("10".to_string()), VariantId("11".to_string())))
        );
        assert_eq!(detail.lines[0].price, Decimal::new(95_000, 0));
        assert_eq!(detail.lines[1].sku, Some(SkuKey::item(ItemId("20".to_string()))));
        assert_eq!(detail.lines[1].quantity, 2);
        assert_eq!(detail.lines[2].sku, Some(SkuKey::bundle(BundleId("77".to_string()))));
    }

    #[test]
    fn item_detail_reads_variant_stock_and_holds() {
        let payload = json!({
            "id": "10", "name": "Gin", "sell_price_pos": "95000", "pos_hidden": 0,
            "variant": [
                {"id": 11, "name": "700ml", "sell_price_pos": "95000", "stock_qty": "4.0", "hold_qty": "1"},
                {"name": "broken"}
            ]
        });

        let parsed = item(&payload).expect("item");
        assert!(!parsed.hidden);
        assert_eq!(parsed.variants.len(), 1);
        assert_eq!(parsed.variants[0].stock, 4);
        assert_eq!(parsed.variants[0].held, 1);
    }

    #[test]
    fn bundle_detail_reads_nested_component_rows() {
        let payload = json!({
            "id": 5, "name": "Paket Gin Hemat", "sell_price_pos": 120000, "pos_hidden": "1",
            "items": {"data": [
                {"id": 1137772, "product_id": 10, "product_variant_id": 11, "qty": 1},
                {"id": 1137773, "product_id": 20, "qty": 2}
            ]}
        });

        let parsed = bundle(&payload).expect("bundle");
        assert!(parsed.hidden);
        assert_eq!(parsed.components.len(), 2);
        assert_eq!(parsed.components[0].row_id.as_deref(), Some("1137772"));
        assert_eq!(parsed.components[1].variant_id, None);
        assert_eq!(parsed.components[1].quantity, 2);
    }

    #[test]
    fn embedded_rate_limit_is_detected() {
        let payload = json!({"error": {"status_code": 429, "message": "Too Many Attempts."}});
        assert_eq!(embedded_error(&payload), Some((429, "Too Many Attempts.".to_string())));
        assert_eq!(embedded_error(&json!({"data": [], "error": null})), None);
    }

    #[test]
    fn listing_pages_report_the_last_page() {
        let payload = json!({
            "data": [{"id": 1, "name": "Gin", "sell_price_pos": "95000", "pos_hidden": 0}],
            "meta": {"current_page": 1, "last_page": 3}
        });

        let page = catalog_page(CatalogKind::Items, &payload);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.items.len(), 1);
        assert!(page.bundles.is_empty());
    }

    #[test]
    fn payment_modes_keep_backend_order() {
        let payload = json!({"data": {"payment_modes": [{"id": 1, "name": "Cash"}, {"id": 2, "name": "BRI"}]}});
        let modes = payment_modes(&payload).expect("modes");
        assert_eq!(modes[1].name, "BRI");
        assert!(payment_modes(&json!({"data": {}})).is_err());
    }
}
