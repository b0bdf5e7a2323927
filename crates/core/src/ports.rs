//! Contracts for every external collaborator the order engine talks to.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::{
    BundleCategory, BundleComponent, BundleId, CatalogBundle, CatalogItem, ItemId,
};
use crate::domain::order::{RemoteOrderId, RemoteOrderStatus, SkuKey};
use crate::domain::request::ResolvedOrderRequest;
use crate::errors::BackendError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerSpec {
    Existing { customer_id: String },
    New { name: String, phone: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_date: NaiveDate,
    pub customer: CustomerSpec,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: RemoteOrderId,
    pub order_no: String,
}

/// One committed row of a remote order. Amounts are the backend's.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDetailLine {
    pub line_id: String,
    pub sku: Option<SkuKey>,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub amount: Decimal,
    pub discount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: RemoteOrderId,
    pub order_no: String,
    pub total_amount: Decimal,
    pub formatted_total: String,
    pub lines: Vec<OrderDetailLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub line_id: String,
    pub discount: Decimal,
    pub note: String,
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMode {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub mode_id: String,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: RemoteOrderId,
    pub order_no: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderTable {
    Open,
    Closed,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    pub bundles: Vec<CatalogBundle>,
    pub last_page: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogKind {
    Items,
    Bundles,
}

#[async_trait]
pub trait PosBackend: Send + Sync {
    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<String>, BackendError>;
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, BackendError>;
    async fn add_item(
        &self,
        order_id: &RemoteOrderId,
        sku: &SkuKey,
        quantity: u32,
    ) -> Result<(), BackendError>;
    async fn add_bundle(
        &self,
        order_id: &RemoteOrderId,
        bundle_id: &BundleId,
        quantity: u32,
        components: &[BundleComponent],
    ) -> Result<(), BackendError>;
    async fn update_line(
        &self,
        order_id: &RemoteOrderId,
        update: &LineUpdate,
    ) -> Result<(), BackendError>;
    async fn fetch_order_detail(&self, order_id: &RemoteOrderId)
        -> Result<OrderDetail, BackendError>;
    async fn list_payment_modes(
        &self,
        order_id: &RemoteOrderId,
    ) -> Result<Vec<PaymentMode>, BackendError>;
    async fn record_payment(
        &self,
        order_id: &RemoteOrderId,
        payment: &PaymentRecord,
    ) -> Result<(), BackendError>;
    async fn set_status(
        &self,
        order_id: &RemoteOrderId,
        status: RemoteOrderStatus,
    ) -> Result<(), BackendError>;
    async fn fetch_item_detail(&self, item_id: &ItemId) -> Result<CatalogItem, BackendError>;
    async fn fetch_bundle_detail(&self, bundle_id: &BundleId)
        -> Result<CatalogBundle, BackendError>;
    async fn find_order_by_number(
        &self,
        table: OrderTable,
        order_no: &str,
    ) -> Result<Option<OrderSummary>, BackendError>;
    async fn list_open_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OrderSummary>, BackendError>;
    async fn list_catalog_page(
        &self,
        kind: CatalogKind,
        page: u32,
    ) -> Result<CatalogPage, BackendError>;
    fn receipt_url(&self, order_no: &str, phone: &str) -> Result<String, BackendError>;
}

/// Instruction set the disambiguator should apply to a candidate list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisambiguationDomain {
    Item,
    Bundle(BundleCategory),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disambiguation {
    Selected(String),
    NoMatch,
}

#[async_trait]
pub trait Disambiguator: Send + Sync {
    /// Must answer with the id of one of `candidates` or `NoMatch`.
    async fn select(
        &self,
        query: &str,
        candidates: &[Candidate],
        domain: DisambiguationDomain,
    ) -> Disambiguation;
}

#[derive(Clone, Debug, PartialEq)]
pub enum TranslatorOutcome {
    Order(Box<ResolvedOrderRequest>),
    Fallback(String),
    Cancel(Vec<String>),
    ClearOpenOrders,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translator unavailable: {0}")]
    Upstream(String),
    #[error("translator returned malformed output: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait OrderTranslator: Send + Sync {
    async fn translate(&self, raw_text: &str) -> Result<TranslatorOutcome, TranslationError>;
}

#[async_trait]
pub trait NotesSummarizer: Send + Sync {
    /// Best effort; returns an empty string when summarization fails.
    async fn summarize(&self, notes: &str) -> String;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub formatted: String,
    pub point: GeoPoint,
    pub village: Option<String>,
    pub district: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

impl RouteEstimate {
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GeoError {
    #[error("address not found: {0}")]
    NotFound(String),
    #[error("no route between store and `{0}`")]
    NoRoute(String),
    #[error("maps request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Accepts a free-text address or a map shortlink.
    async fn resolve(&self, address: &str) -> Result<ResolvedAddress, GeoError>;
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError>;
}
