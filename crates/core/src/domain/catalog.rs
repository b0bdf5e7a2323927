use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sellable stock-keeping unit under an item. Stock and price are live
/// values copied from the backend's item detail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    #[serde(default)]
    pub held: i64,
}

impl Variant {
    /// Units that can still be sold: zero when the variant is out of stock or
    /// fully held by other open orders.
    pub fn sellable(&self, discontinued_marker: &str) -> i64 {
        if !discontinued_marker.is_empty() && self.name.starts_with(discontinued_marker) {
            return 0;
        }
        if self.stock <= 0 || self.stock - self.held <= 0 {
            return 0;
        }
        self.stock
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleComponent {
    /// Row id of the component inside the bundle definition, when the
    /// backend exposes one. Required by the add-bundle call.
    #[serde(default)]
    pub row_id: Option<String>,
    pub item_id: ItemId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleCategory {
    Merch,
    Guarantee,
    Coupon,
    Voucher,
    Compliment,
    Delivery,
    Prize,
    #[default]
    Plain,
}

impl BundleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merch => "merch",
            Self::Guarantee => "guarantee",
            Self::Coupon => "coupon",
            Self::Voucher => "voucher",
            Self::Compliment => "compliment",
            Self::Delivery => "delivery",
            Self::Prize => "prize",
            Self::Plain => "plain",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogBundle {
    pub id: BundleId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub components: Vec<BundleComponent>,
    #[serde(default)]
    pub hidden: bool,
    /// Assigned from the bundle name by the category rules when the index is built.
    #[serde(default)]
    pub category: BundleCategory,
}

/// Serialized catalog as written by the catalog sync job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub items: Vec<CatalogItem>,
    #[serde(default)]
    pub bundles: Vec<CatalogBundle>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}
