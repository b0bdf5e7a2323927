use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{BundleComponent, BundleId, ItemId, VariantId};
use crate::errors::DomainError;

/// Identity used to merge lines and to correlate them with backend rows.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkuKey {
    Item { item_id: ItemId },
    Variant { item_id: ItemId, variant_id: VariantId },
    Bundle { bundle_id: BundleId },
}

impl SkuKey {
    pub fn item(item_id: ItemId) -> Self {
        Self::Item { item_id }
    }

    pub fn variant(item_id: ItemId, variant_id: VariantId) -> Self {
        Self::Variant { item_id, variant_id }
    }

    pub fn bundle(bundle_id: BundleId) -> Self {
        Self::Bundle { bundle_id }
    }
}

impl fmt::Display for SkuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item { item_id } => write!(f, "{item_id}"),
            Self::Variant { item_id, variant_id } => write!(f, "{item_id}|{variant_id}"),
            Self::Bundle { bundle_id } => write!(f, "bundle:{bundle_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineOrigin {
    Item,
    BundleComponent { bundle_id: BundleId },
    OpaqueBundle { components: Vec<BundleComponent> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: SkuKey,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub origin: LineOrigin,
}

impl OrderLine {
    pub fn gross(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn net(&self) -> Decimal {
        self.gross() - self.discount
    }

    /// Discounts may not exceed the gross amount. Violations are reported,
    /// never rejected.
    pub fn discount_within_gross(&self) -> bool {
        self.discount <= self.gross()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteOrderId(pub String);

impl fmt::Display for RemoteOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status values persisted by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteOrderStatus {
    Open,
    Voided,
    Finalized,
}

impl RemoteOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Voided => "voided",
            Self::Finalized => "finalized",
        }
    }
}

/// Local lifecycle of one commit run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStage {
    Created,
    ItemsAdded,
    DiscountsApplied,
    Paid,
    UnpaidOpen,
    Voided,
}

impl OrderStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::UnpaidOpen | Self::Voided)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ItemsAdded => "items_added",
            Self::DiscountsApplied => "discounts_applied",
            Self::Paid => "paid",
            Self::UnpaidOpen => "unpaid_open",
            Self::Voided => "voided",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: RemoteOrderId,
    pub order_no: String,
    pub stage: OrderStage,
}

impl RemoteOrder {
    pub fn created(id: RemoteOrderId, order_no: impl Into<String>) -> Self {
        Self { id, order_no: order_no.into(), stage: OrderStage::Created }
    }

    pub fn can_transition_to(&self, next: OrderStage) -> bool {
        matches!(
            (self.stage, next),
            (OrderStage::Created, OrderStage::ItemsAdded)
                | (OrderStage::ItemsAdded, OrderStage::DiscountsApplied)
                | (OrderStage::DiscountsApplied, OrderStage::Paid)
                | (OrderStage::DiscountsApplied, OrderStage::UnpaidOpen)
        ) || (next == OrderStage::Voided && !self.stage.is_terminal())
    }

    pub fn transition_to(&mut self, next: OrderStage) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.stage = next;
            return Ok(());
        }

        Err(DomainError::InvalidStageTransition { from: self.stage, to: next })
    }
}
