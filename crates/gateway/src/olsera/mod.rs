//! `PosBackend` over the Olsera open API.

pub mod wire;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{debug, warn};

use kasir_core::config::PosConfig;
use kasir_core::domain::catalog::{BundleComponent, BundleId, CatalogBundle, CatalogItem, ItemId};
use kasir_core::domain::order::{RemoteOrderId, RemoteOrderStatus, SkuKey};
use kasir_core::errors::BackendError;
use kasir_core::ports::{
    CatalogKind, CatalogPage, CreatedOrder, CustomerSpec, LineUpdate, NewOrder, OrderDetail,
    OrderSummary, OrderTable, PaymentMode, PaymentRecord, PosBackend,
};

use crate::token::TokenStore;

const PAGE_SIZE: &str = "100";

/// Local numbers are stored with the country prefix.
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    match trimmed.strip_prefix('0') {
        Some(rest) => format!("+62{rest}"),
        None => trimmed.to_string(),
    }
}

/// Maps a non-success status to the backend error taxonomy.
pub fn status_error(operation: &str, status: StatusCode, body: &str) -> BackendError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited { operation: operation.to_string() },
        StatusCode::NOT_FOUND => BackendError::NotFound { operation: operation.to_string() },
        other => {
            let snippet: String = body.chars().take(200).collect();
            BackendError::transport(operation, format!("status {other}: {snippet}"))
        }
    }
}

fn embedded_failure(operation: &str, payload: &Value) -> Option<BackendError> {
    let (status, message) = wire::embedded_error(payload)?;
    Some(match StatusCode::from_u16(status) {
        Ok(StatusCode::TOO_MANY_REQUESTS) => BackendError::RateLimited { operation: operation.to_string() },
        Ok(StatusCode::NOT_FOUND) => BackendError::NotFound { operation: operation.to_string() },
        _ => BackendError::Rejected { operation: operation.to_string(), message },
    })
}

/// Adding a line to an open order answers with the updated order; an empty
/// success body means the backend had no stock left to allocate.
pub fn line_added(operation: &str, payload: &Value) -> Result<(), BackendError> {
    let empty = match payload {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(rows) => rows.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    };
    if empty {
        return Err(BackendError::Rejected {
            operation: operation.to_string(),
            message: "stock exhausted: the backend added nothing".to_string(),
        });
    }
    Ok(())
}

fn decode_error(operation: &str, detail: impl ToString) -> BackendError {
    BackendError::transport(operation, format!("undecodable response: {}", detail.to_string()))
}

pub struct OlseraClient {
    http: Client,
    base_url: String,
    tokens: TokenStore,
    receipt_base_url: String,
    store_slug: String,
    customer_type_id: String,
}

impl OlseraClient {
    pub fn new(http: Client, config: &PosConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens: TokenStore::new(config.token_cache_path.clone()),
            receipt_base_url: config.receipt_base_url.clone(),
            store_slug: config.store_slug.clone(),
            customer_type_id: config.customer_type_id.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Value, BackendError> {
        let token = self.tokens.bearer()?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|error| BackendError::transport(operation, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = status_error(operation, status, &body);
            warn!(event_name = "gateway.pos.call_failed", operation, %status, error = %error, "backend call failed");
            return Err(error);
        }

        let body = response.text().await.map_err(|error| decode_error(operation, error))?;
        let payload: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|error| decode_error(operation, error))?
        };
        if let Some(error) = embedded_failure(operation, &payload) {
            warn!(event_name = "gateway.pos.call_rejected", operation, error = %error, "backend reported an error");
            return Err(error);
        }
        debug!(event_name = "gateway.pos.call_succeeded", operation, "backend call succeeded");
        Ok(payload)
    }

    async fn get(&self, operation: &str, path: &str, query: &[(&str, String)]) -> Result<Value, BackendError> {
        self.send(operation, self.http.get(self.url(path)).query(query)).await
    }

    async fn post_json(&self, operation: &str, path: &str, body: Value) -> Result<Value, BackendError> {
        self.send(operation, self.http.post(self.url(path)).json(&body)).await
    }

    async fn search(
        &self,
        operation: &str,
        path: &str,
        column: &str,
        text: &str,
    ) -> Result<Value, BackendError> {
        let query = [("search_column[]", column.to_string()), ("search_text[]", text.to_string())];
        self.get(operation, path, &query).await
    }
}

/// Form fields for adding a bundle with its component selections.
pub fn bundle_form(
    order_id: &RemoteOrderId,
    bundle_id: &BundleId,
    quantity: u32,
    components: &[BundleComponent],
) -> Vec<(String, String)> {
    let mut form = vec![
        ("order_id".to_string(), order_id.0.clone()),
        ("item_combo_id".to_string(), bundle_id.0.clone()),
        ("item_combo_qty".to_string(), quantity.to_string()),
    ];
    for (index, component) in components.iter().enumerate() {
        if let Some(row_id) = &component.row_id {
            form.push((format!("item_combo_items[{index}][id]"), row_id.clone()));
        }
        form.push((format!("item_combo_items[{index}][product_id]"), component.item_id.0.clone()));
        if let Some(variant_id) = &component.variant_id {
            form.push((format!("item_combo_items[{index}][product_variant_id]"), variant_id.0.clone()));
        }
    }
    form
}

fn sku_product(sku: &SkuKey) -> Result<String, BackendError> {
    match sku {
        SkuKey::Item { item_id } => Ok(item_id.0.clone()),
        SkuKey::Variant { item_id, variant_id } => Ok(format!("{item_id}|{variant_id}")),
        SkuKey::Bundle { bundle_id } => Err(BackendError::Rejected {
            operation: "add_item".to_string(),
            message: format!("bundle {bundle_id} must be added with its components"),
        }),
    }
}

#[async_trait]
impl PosBackend for OlseraClient {
    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<String>, BackendError> {
        let payload = self
            .search("find_customer", "customersupplier/customer", "phone", &normalize_phone(phone))
            .await?;
        Ok(wire::customer_id(&payload))
    }

    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, BackendError> {
        let mut body = json!({
            "order_date": order.order_date.format("%Y-%m-%d").to_string(),
            "currency_id": "IDR",
            "notes": order.notes,
        });
        match &order.customer {
            CustomerSpec::Existing { customer_id } => {
                body["customer_id"] = json!(customer_id);
            }
            CustomerSpec::New { name, phone } => {
                body["customer_name"] = json!(name);
                body["customer_phone"] = json!(phone);
                body["customer_type_id"] = json!(self.customer_type_id);
            }
        }
        let payload = self.post_json("create_order", "order/openorder", body).await?;
        wire::created_order(&payload).map_err(|detail| decode_error("create_order", detail))
    }

    async fn add_item(
        &self,
        order_id: &RemoteOrderId,
        sku: &SkuKey,
        quantity: u32,
    ) -> Result<(), BackendError> {
        let body = json!({
            "order_id": order_id.0,
            "item_products": sku_product(sku)?,
            "item_qty": quantity,
        });
        let payload = self.post_json("add_item", "order/openorder/additem", body).await?;
        line_added("add_item", &payload)
    }

    async fn add_bundle(
        &self,
        order_id: &RemoteOrderId,
        bundle_id: &BundleId,
        quantity: u32,
        components: &[BundleComponent],
    ) -> Result<(), BackendError> {
        let form = bundle_form(order_id, bundle_id, quantity, components);
        let request = self.http.post(self.url("order/openorder/additemcombo")).form(&form);
        let payload = self.send("add_bundle", request).await?;
        line_added("add_bundle", &payload)
    }

    async fn update_line(
        &self,
        order_id: &RemoteOrderId,
        update: &LineUpdate,
    ) -> Result<(), BackendError> {
        let body = json!({
            "order_id": order_id.0,
            "id": update.line_id,
            "discount": update.discount.to_string(),
            "note": update.note,
            "price": update.price.round_dp(0).to_string(),
            "qty": update.quantity.to_string(),
        });
        self.post_json("update_line", "order/openorder/updatedetail", body).await.map(|_| ())
    }

    async fn fetch_order_detail(
        &self,
        order_id: &RemoteOrderId,
    ) -> Result<OrderDetail, BackendError> {
        let payload = self
            .get("fetch_order_detail", "order/openorder/detail", &[("id", order_id.0.clone())])
            .await?;
        wire::order_detail(&payload).map_err(|detail| decode_error("fetch_order_detail", detail))
    }

    async fn list_payment_modes(
        &self,
        order_id: &RemoteOrderId,
    ) -> Result<Vec<PaymentMode>, BackendError> {
        let payload = self
            .get("list_payment_modes", "order/openorder/editpayment", &[("order_id", order_id.0.clone())])
            .await?;
        wire::payment_modes(&payload).map_err(|detail| decode_error("list_payment_modes", detail))
    }

    async fn record_payment(
        &self,
        order_id: &RemoteOrderId,
        payment: &PaymentRecord,
    ) -> Result<(), BackendError> {
        let body = json!({
            "order_id": order_id.0,
            "payment_amount": payment.amount.round_dp(0).to_string(),
            "payment_date": payment.paid_on.format("%Y-%m-%d").to_string(),
            "payment_mode_id": payment.mode_id,
            "payment_payee": "kasir",
            "payment_seq": "0",
            "payment_currency_id": "IDR",
        });
        self.post_json("record_payment", "order/openorder/updatepayment", body).await.map(|_| ())
    }

    async fn set_status(
        &self,
        order_id: &RemoteOrderId,
        status: RemoteOrderStatus,
    ) -> Result<(), BackendError> {
        let body = json!({"order_id": order_id.0, "status": wire::status_code(status)});
        self.post_json("set_status", "order/openorder/updatestatus", body).await.map(|_| ())
    }

    async fn fetch_item_detail(&self, item_id: &ItemId) -> Result<CatalogItem, BackendError> {
        let payload =
            self.get("fetch_item_detail", "product/detail", &[("id", item_id.0.clone())]).await?;
        wire::item(wire::detail_body(&payload))
            .map_err(|detail| decode_error("fetch_item_detail", detail))
    }

    async fn fetch_bundle_detail(
        &self,
        bundle_id: &BundleId,
    ) -> Result<CatalogBundle, BackendError> {
        let payload = self
            .get("fetch_bundle_detail", "productcombo/detail", &[("id", bundle_id.0.clone())])
            .await?;
        wire::bundle(wire::detail_body(&payload))
            .map_err(|detail| decode_error("fetch_bundle_detail", detail))
    }

    async fn find_order_by_number(
        &self,
        table: OrderTable,
        order_no: &str,
    ) -> Result<Option<OrderSummary>, BackendError> {
        let path = match table {
            OrderTable::Open => "order/openorder",
            OrderTable::Closed => "order/closeorder",
        };
        let payload = self.search("find_order", path, "order_no", order_no).await?;
        Ok(wire::order_summaries(&payload).into_iter().find(|summary| summary.order_no == order_no))
    }

    async fn list_open_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OrderSummary>, BackendError> {
        let query = [
            ("start_date", from.format("%Y-%m-%d").to_string()),
            ("end_date", to.format("%Y-%m-%d").to_string()),
        ];
        let payload = self.get("list_open_orders", "order/openorder", &query).await?;
        Ok(wire::order_summaries(&payload))
    }

    async fn list_catalog_page(
        &self,
        kind: CatalogKind,
        page: u32,
    ) -> Result<CatalogPage, BackendError> {
        let path = match kind {
            CatalogKind::Items => "product",
            CatalogKind::Bundles => "productcombo",
        };
        let query = [("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
        let payload = self.get("list_catalog_page", path, &query).await?;
        Ok(wire::catalog_page(kind, &payload))
    }

    fn receipt_url(&self, order_no: &str, _phone: &str) -> Result<String, BackendError> {
        Url::parse_with_params(
            &self.receipt_base_url,
            &[("lang", "id"), ("store", self.store_slug.as_str()), ("order_no", order_no)],
        )
        .map(String::from)
        .map_err(|error| BackendError::transport("receipt_url", error))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use reqwest::StatusCode;
    use serde_json::json;

    use kasir_core::config::AppConfig;
    use kasir_core::domain::catalog::{BundleComponent, BundleId, ItemId, VariantId};
    use kasir_core::domain::order::RemoteOrderId;
    use kasir_core::errors::BackendError;
    use kasir_core::ports::PosBackend;

    use super::{bundle_form, line_added, normalize_phone, status_error, OlseraClient};

    #[test]
    fn local_numbers_get_the_country_prefix() {
        assert_eq!(normalize_phone("081234567890"), "+6281234567890");
        assert_eq!(normalize_phone(" +6281234567890 "), "+6281234567890");
    }

    #[test]
    fn statuses_map_to_the_error_taxonomy() {
        assert!(status_error("add_item", StatusCode::TOO_MANY_REQUESTS, "").is_rate_limited());
        assert_eq!(
            status_error("detail", StatusCode::NOT_FOUND, ""),
            BackendError::NotFound { operation: "detail".to_string() }
        );
        assert!(matches!(
            status_error("detail", StatusCode::BAD_GATEWAY, "upstream"),
            BackendError::Transport { .. }
        ));
    }

    #[test]
    fn empty_success_body_on_line_add_means_stock_exhausted() {
        for payload in [json!(null), json!(""), json!({}), json!([])] {
            match line_added("add_item", &payload) {
                Err(BackendError::Rejected { operation, message }) => {
                    assert_eq!(operation, "add_item");
                    assert!(message.contains("stock exhausted"));
                }
                other => panic!("unexpected outcome for {payload}: {other:?}"),
            }
        }
        assert!(matches!(
            line_added("add_bundle", &json!(null)),
            Err(BackendError::Rejected { .. })
        ));
        assert!(line_added("add_bundle", &json!({"data": {"id": 9}})).is_ok());
    }

    #[test]
    fn bundle_form_lists_each_component_selection() {
        let components = vec![
            BundleComponent {
                row_id: Some("1137772".to_string()),
                item_id: ItemId("82305178".to_string()),
                variant_id: Some(VariantId("44459921".to_string())),
                quantity: 1,
            },
            BundleComponent {
                row_id: None,
                item_id: ItemId("20".to_string()),
                variant_id: None,
                quantity: 2,
            },
        ];

        let form = bundle_form(&RemoteOrderId("9".to_string()), &BundleId("b1".to_string()), 2, &components);
        let find = |key: &str| form.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str());

        assert_eq!(find("item_combo_qty"), Some("2"));
        assert_eq!(find("item_combo_items[0][id]"), Some("1137772"));
        assert_eq!(find("item_combo_items[0][product_variant_id]"), Some("44459921"));
        assert_eq!(find("item_combo_items[1][product_id]"), Some("20"));
        assert_eq!(find("item_combo_items[1][id]"), None);
    }

    #[test]
    fn receipt_url_carries_store_and_order_number() {
        let mut config = AppConfig::default().pos;
        config.token_cache_path = PathBuf::from("unused.json");
        let client = OlseraClient::new(reqwest::Client::new(), &config);

        let url = client.receipt_url("SO 12", "+62812").expect("url");
        assert_eq!(
            url,
            "https://invoice.olsera.co.id/pos-receipt?lang=id&store=kulkasbabe&order_no=SO+12"
        );
    }
}
