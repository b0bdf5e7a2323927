//! Scripted stand-ins for the POS backend and the disambiguator.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::catalog::{BundleComponent, BundleId, CatalogBundle, CatalogItem, ItemId};
use crate::domain::order::{RemoteOrderId, RemoteOrderStatus, SkuKey};
use crate::errors::BackendError;
use crate::ports::{
    CatalogKind, CatalogPage, Candidate, CreatedOrder, CustomerSpec, Disambiguation,
    DisambiguationDomain, Disambiguator, LineUpdate, NewOrder, OrderDetail, OrderDetailLine,
    OrderSummary, OrderTable, PaymentMode, PaymentRecord, PosBackend,
};

#[derive(Clone, Debug, PartialEq)]
pub struct FakeOrder {
    pub id: RemoteOrderId,
    pub order_no: String,
    pub status: RemoteOrderStatus,
    pub customer: CustomerSpec,
    pub notes: String,
    pub order_date: NaiveDate,
    pub lines: Vec<OrderDetailLine>,
    pub payments: Vec<PaymentRecord>,
}

impl FakeOrder {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }
}

#[derive(Clone, Debug)]
struct ScriptedFailure {
    operation: String,
    successes_before: usize,
    error: BackendError,
}

#[derive(Default)]
struct FakeState {
    items: HashMap<ItemId, CatalogItem>,
    bundles: HashMap<BundleId, CatalogBundle>,
    customers: HashMap<String, String>,
    orders: Vec<FakeOrder>,
    calls: Vec<String>,
    successes: HashMap<String, usize>,
    failures: Vec<ScriptedFailure>,
    payment_modes: Vec<PaymentMode>,
    next_line: u64,
}

/// In-memory POS backend that prices lines the way the real one does and
/// records every call.
#[derive(Default)]
pub struct FakePosBackend {
    state: Mutex<FakeState>,
}

impl FakePosBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.lock().payment_modes = ["Cash", "BRI", "Hutang", "BCA", "QRIS"]
            .iter()
            .enumerate()
            .map(|(index, name)| PaymentMode { id: format!("pm-{index}"), name: name.to_string() })
            .collect();
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn with_item(self, item: CatalogItem) -> Self {
        self.lock().items.insert(item.id.clone(), item);
        self
    }

    pub fn with_bundle(self, bundle: CatalogBundle) -> Self {
        self.lock().bundles.insert(bundle.id.clone(), bundle);
        self
    }

    pub fn with_customer(self, phone: &str, customer_id: &str) -> Self {
        self.lock().customers.insert(phone.to_string(), customer_id.to_string());
        self
    }

    pub fn with_order(self, order: FakeOrder) -> Self {
        self.lock().orders.push(order);
        self
    }

    /// Every call to `operation` fails with `error` once it has succeeded
    /// `successes_before` times.
    pub fn fail_after(self, operation: &str, successes_before: usize, error: BackendError) -> Self {
        self.lock().failures.push(ScriptedFailure {
            operation: operation.to_string(),
            successes_before,
            error,
        });
        self
    }

    pub fn fail_on(self, operation: &str, error: BackendError) -> Self {
        self.fail_after(operation, 0, error)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|call| call.split(' ').next() == Some(operation)).count()
    }

    pub fn orders(&self) -> Vec<FakeOrder> {
        self.lock().orders.clone()
    }

    pub fn order(&self, order_id: &RemoteOrderId) -> Option<FakeOrder> {
        self.lock().orders.iter().find(|order| &order.id == order_id).cloned()
    }

    fn enter(&self, operation: &str, detail: String) -> Result<MutexGuard<'_, FakeState>, BackendError> {
        let mut state = self.lock();
        state.calls.push(if detail.is_empty() { operation.to_string() } else { format!("{operation} {detail}") });

        let done = state.successes.get(operation).copied().unwrap_or(0);
        let failure = state
            .failures
            .iter()
            .find(|failure| failure.operation == operation && done >= failure.successes_before)
            .map(|failure| failure.error.clone());
        if let Some(error) = failure {
            return Err(error);
        }

        *state.successes.entry(operation.to_string()).or_default() += 1;
        Ok(state)
    }
}

fn not_found(operation: &str) -> BackendError {
    BackendError::NotFound { operation: operation.to_string() }
}

fn find_order<'a>(
    state: &'a mut FakeState,
    order_id: &RemoteOrderId,
    operation: &str,
) -> Result<&'a mut FakeOrder, BackendError> {
    state.orders.iter_mut().find(|order| &order.id == order_id).ok_or_else(|| not_found(operation))
}

fn item_price(state: &FakeState, sku: &SkuKey) -> Option<(String, Decimal)> {
    match sku {
        SkuKey::Item { item_id } => {
            state.items.get(item_id).map(|item| (item.name.clone(), item.price))
        }
        SkuKey::Variant { item_id, variant_id } => state.items.get(item_id).and_then(|item| {
            item.variants
                .iter()
                .find(|variant| &variant.id == variant_id)
                .map(|variant| (item.name.clone(), variant.price))
        }),
        SkuKey::Bundle { bundle_id } => {
            state.bundles.get(bundle_id).map(|bundle| (bundle.name.clone(), bundle.price))
        }
    }
}

#[async_trait]
impl PosBackend for FakePosBackend {
    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<String>, BackendError> {
        let state = self.enter("find_customer", phone.to_string())?;
        Ok(state.customers.get(phone).cloned())
    }

    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, BackendError> {
        let mut state = self.enter("create_order", String::new())?;
        let sequence = state.orders.len() + 1;
        let created = FakeOrder {
            id: RemoteOrderId(format!("{}", 9000 + sequence)),
            order_no: format!("SO-{sequence:04}"),
            status: RemoteOrderStatus::Open,
            customer: order.customer.clone(),
            notes: order.notes.clone(),
            order_date: order.order_date,
            lines: Vec::new(),
            payments: Vec::new(),
        };
        let result = CreatedOrder { id: created.id.clone(), order_no: created.order_no.clone() };
        state.orders.push(created);
        Ok(result)
    }

    async fn add_item(
        &self,
        order_id: &RemoteOrderId,
        sku: &SkuKey,
        quantity: u32,
    ) -> Result<(), BackendError> {
        let mut state = self.enter("add_item", format!("{sku} x{quantity}"))?;
        let (name, price) = item_price(&state, sku).ok_or_else(|| not_found("add_item"))?;
        state.next_line += 1;
        let line_id = format!("L{}", state.next_line);
        let order = find_order(&mut state, order_id, "add_item")?;
        order.lines.push(OrderDetailLine {
            line_id,
            sku: Some(sku.clone()),
            name,
            quantity,
            price,
            amount: price * Decimal::from(quantity),
            discount: Decimal::ZERO,
        });
        Ok(())
    }

    async fn add_bundle(
        &self,
        order_id: &RemoteOrderId,
        bundle_id: &BundleId,
        quantity: u32,
        components: &[BundleComponent],
    ) -> Result<(), BackendError> {
        let mut state =
            self.enter("add_bundle", format!("{bundle_id} x{quantity} ({} components)", components.len()))?;
        let sku = SkuKey::bundle(bundle_id.clone());
        let (name, price) = item_price(&state, &sku).ok_or_else(|| not_found("add_bundle"))?;
        state.next_line += 1;
        let line_id = format!("L{}", state.next_line);
        let order = find_order(&mut state, order_id, "add_bundle")?;
        order.lines.push(OrderDetailLine {
            line_id,
            sku: Some(sku),
            name,
            quantity,
            price,
            amount: price * Decimal::from(quantity),
            discount: Decimal::ZERO,
        });
        Ok(())
    }

    async fn update_line(
        &self,
        order_id: &RemoteOrderId,
        update: &LineUpdate,
    ) -> Result<(), BackendError> {
        let mut state = self.enter("update_line", format!("{} -{}", update.line_id, update.discount))?;
        let order = find_order(&mut state, order_id, "update_line")?;
        let line = order
            .lines
            .iter_mut()
            .find(|line| line.line_id == update.line_id)
            .ok_or_else(|| not_found("update_line"))?;
        line.discount = update.discount;
        line.price = update.price;
        line.quantity = update.quantity;
        line.amount = update.price * Decimal::from(update.quantity) - update.discount;
        Ok(())
    }

    async fn fetch_order_detail(
        &self,
        order_id: &RemoteOrderId,
    ) -> Result<OrderDetail, BackendError> {
        let mut state = self.enter("fetch_order_detail", order_id.to_string())?;
        let order = find_order(&mut state, order_id, "fetch_order_detail")?;
        let total = order.total();
        Ok(OrderDetail {
            id: order.id.clone(),
            order_no: order.order_no.clone(),
            total_amount: total,
            formatted_total: format!("Rp {}", total.round_dp(0)),
            lines: order.lines.clone(),
        })
    }

    async fn list_payment_modes(
        &self,
        order_id: &RemoteOrderId,
    ) -> Result<Vec<PaymentMode>, BackendError> {
        let state = self.enter("list_payment_modes", order_id.to_string())?;
        Ok(state.payment_modes.clone())
    }

    async fn record_payment(
        &self,
        order_id: &RemoteOrderId,
        payment: &PaymentRecord,
    ) -> Result<(), BackendError> {
        let mut state = self.enter("record_payment", payment.mode_id.clone())?;
        let order = find_order(&mut state, order_id, "record_payment")?;
        order.payments.push(payment.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        order_id: &RemoteOrderId,
        status: RemoteOrderStatus,
    ) -> Result<(), BackendError> {
        let mut state = self.enter("set_status", format!("{order_id} {}", status.as_str()))?;
        let order = find_order(&mut state, order_id, "set_status")?;
        order.status = status;
        Ok(())
    }

    async fn fetch_item_detail(&self, item_id: &ItemId) -> Result<CatalogItem, BackendError> {
        let state = self.enter("fetch_item_detail", item_id.to_string())?;
        state.items.get(item_id).cloned().ok_or_else(|| not_found("fetch_item_detail"))
    }

    async fn fetch_bundle_detail(
        &self,
        bundle_id: &BundleId,
    ) -> Result<CatalogBundle, BackendError> {
        let state = self.enter("fetch_bundle_detail", bundle_id.to_string())?;
        state.bundles.get(bundle_id).cloned().ok_or_else(|| not_found("fetch_bundle_detail"))
    }

    async fn find_order_by_number(
        &self,
        table: OrderTable,
        order_no: &str,
    ) -> Result<Option<OrderSummary>, BackendError> {
        let state = self.enter("find_order", order_no.to_string())?;
        let found = state.orders.iter().find(|order| {
            order.order_no == order_no
                && match table {
                    OrderTable::Open => order.status == RemoteOrderStatus::Open,
                    OrderTable::Closed => order.status != RemoteOrderStatus::Open,
                }
        });
        Ok(found.map(|order| OrderSummary { id: order.id.clone(), order_no: order.order_no.clone() }))
    }

    async fn list_open_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OrderSummary>, BackendError> {
        let state = self.enter("list_open_orders", format!("{from}..{to}"))?;
        Ok(state
            .orders
            .iter()
            .filter(|order| order.status == RemoteOrderStatus::Open)
            .filter(|order| order.order_date >= from && order.order_date <= to)
            .map(|order| OrderSummary { id: order.id.clone(), order_no: order.order_no.clone() })
            .collect())
    }

    async fn list_catalog_page(
        &self,
        kind: CatalogKind,
        page: u32,
    ) -> Result<CatalogPage, BackendError> {
        let state = self.enter("list_catalog_page", format!("{kind:?} {page}"))?;
        let mut result = CatalogPage { last_page: 1, ..CatalogPage::default() };
        if page == 1 {
            match kind {
                CatalogKind::Items => result.items = state.items.values().cloned().collect(),
                CatalogKind::Bundles => result.bundles = state.bundles.values().cloned().collect(),
            }
        }
        Ok(result)
    }

    fn receipt_url(&self, order_no: &str, _phone: &str) -> Result<String, BackendError> {
        Ok(format!("https://receipts.test/{order_no}"))
    }
}

/// Picks the first candidate unless a query is scripted otherwise.
#[derive(Default)]
pub struct ScriptedDisambiguator {
    answers: HashMap<String, Disambiguation>,
    seen: Mutex<Vec<(String, DisambiguationDomain, usize)>>,
}

impl ScriptedDisambiguator {
    pub fn answer(mut self, query: &str, answer: Disambiguation) -> Self {
        self.answers.insert(query.to_string(), answer);
        self
    }

    /// `(query, domain, candidate count)` for each call.
    pub fn seen(&self) -> Vec<(String, DisambiguationDomain, usize)> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Disambiguator for ScriptedDisambiguator {
    async fn select(
        &self,
        query: &str,
        candidates: &[Candidate],
        domain: DisambiguationDomain,
    ) -> Disambiguation {
        match self.seen.lock() {
            Ok(mut seen) => seen.push((query.to_string(), domain, candidates.len())),
            Err(poisoned) => poisoned.into_inner().push((query.to_string(), domain, candidates.len())),
        }
        if let Some(answer) = self.answers.get(query) {
            return answer.clone();
        }
        candidates
            .first()
            .map(|candidate| Disambiguation::Selected(candidate.id.clone()))
            .unwrap_or(Disambiguation::NoMatch)
    }
}
