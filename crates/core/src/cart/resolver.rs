use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::cart::proration::prorate;
use crate::catalog::CatalogIndex;
use crate::config::BundleMode;
use crate::domain::catalog::CatalogBundle;
use crate::domain::catalog::CatalogItem;
use crate::domain::order::{LineOrigin, OrderLine, SkuKey};
use crate::domain::request::{LineKind, LineRequest};
use crate::errors::ResolutionError;
use crate::ports::{Candidate, Disambiguation, DisambiguationDomain, Disambiguator, PosBackend};

/// Splits `quantity` units of `item` over its sellable variants in catalog
/// order. Items without variants are sold at the item price with no stock
/// check.
pub fn allocate(
    item: &CatalogItem,
    quantity: u32,
    discontinued_marker: &str,
    origin: &LineOrigin,
) -> Result<Vec<OrderLine>, ResolutionError> {
    if item.variants.is_empty() {
        return Ok(vec![OrderLine {
            sku: SkuKey::item(item.id.clone()),
            name: item.name.clone(),
            quantity,
            unit_price: item.price,
            discount: Decimal::ZERO,
            origin: origin.clone(),
        }]);
    }

    let mut remaining = quantity;
    let mut lines = Vec::new();
    for variant in &item.variants {
        if remaining == 0 {
            break;
        }
        let sellable = variant.sellable(discontinued_marker);
        if sellable <= 0 {
            continue;
        }
        let take = remaining.min(u32::try_from(sellable).unwrap_or(u32::MAX));
        lines.push(OrderLine {
            sku: SkuKey::variant(item.id.clone(), variant.id.clone()),
            name: item.name.clone(),
            quantity: take,
            unit_price: variant.price,
            discount: Decimal::ZERO,
            origin: origin.clone(),
        });
        remaining -= take;
    }

    if remaining > 0 {
        return Err(ResolutionError::InsufficientStock {
            product: item.name.clone(),
            shortfall: remaining,
        });
    }

    Ok(lines)
}

/// How a chosen bundle turns into order lines.
#[async_trait]
pub trait BundleStrategy: Send + Sync {
    fn mode(&self) -> BundleMode;

    async fn lines(
        &self,
        bundle: &CatalogBundle,
        quantity: u32,
        backend: &dyn PosBackend,
    ) -> Result<Vec<OrderLine>, ResolutionError>;
}

/// One bundle-marker line; the backend's add-bundle call prorates.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpaqueBundles;

#[async_trait]
impl BundleStrategy for OpaqueBundles {
    fn mode(&self) -> BundleMode {
        BundleMode::Opaque
    }

    async fn lines(
        &self,
        bundle: &CatalogBundle,
        quantity: u32,
        _backend: &dyn PosBackend,
    ) -> Result<Vec<OrderLine>, ResolutionError> {
        Ok(vec![OrderLine {
            sku: SkuKey::bundle(bundle.id.clone()),
            name: bundle.name.clone(),
            quantity,
            unit_price: bundle.price,
            discount: Decimal::ZERO,
            origin: LineOrigin::OpaqueBundle { components: bundle.components.clone() },
        }])
    }
}

/// Components are stock-checked individually and carry prorated discounts.
#[derive(Clone, Debug)]
pub struct ExpandedBundles {
    discontinued_marker: String,
}

impl ExpandedBundles {
    pub fn new(discontinued_marker: impl Into<String>) -> Self {
        Self { discontinued_marker: discontinued_marker.into() }
    }
}

#[async_trait]
impl BundleStrategy for ExpandedBundles {
    fn mode(&self) -> BundleMode {
        BundleMode::Expanded
    }

    async fn lines(
        &self,
        bundle: &CatalogBundle,
        quantity: u32,
        backend: &dyn PosBackend,
    ) -> Result<Vec<OrderLine>, ResolutionError> {
        let detail = backend
            .fetch_bundle_detail(&bundle.id)
            .await
            .map_err(|source| ResolutionError::Backend { query: bundle.name.clone(), source })?;
        let origin = LineOrigin::BundleComponent { bundle_id: bundle.id.clone() };

        let mut lines = Vec::new();
        for component in &detail.components {
            let item = backend.fetch_item_detail(&component.item_id).await.map_err(|source| {
                ResolutionError::Backend { query: bundle.name.clone(), source }
            })?;
            let needed = component.quantity.saturating_mul(quantity);
            lines.extend(allocate(&item, needed, &self.discontinued_marker, &origin)?);
        }

        let outcome = prorate(&mut lines, detail.price, quantity);
        debug!(
            event_name = "cart.bundle.expanded",
            bundle_id = %bundle.id,
            components = lines.len(),
            normal_total = %outcome.normal_total,
            bundle_total = %outcome.bundle_total,
            "bundle expanded into component lines"
        );
        Ok(lines)
    }
}

pub fn strategy_for(mode: BundleMode, discontinued_marker: &str) -> Arc<dyn BundleStrategy> {
    match mode {
        BundleMode::Opaque => Arc::new(OpaqueBundles),
        BundleMode::Expanded => Arc::new(ExpandedBundles::new(discontinued_marker)),
    }
}

/// Turns free-text line requests into concrete order lines.
pub struct CatalogResolver {
    index: Arc<CatalogIndex>,
    backend: Arc<dyn PosBackend>,
    disambiguator: Arc<dyn Disambiguator>,
    bundles: Arc<dyn BundleStrategy>,
    top_k: usize,
    discontinued_marker: String,
}

impl CatalogResolver {
    pub fn new(
        index: Arc<CatalogIndex>,
        backend: Arc<dyn PosBackend>,
        disambiguator: Arc<dyn Disambiguator>,
        bundles: Arc<dyn BundleStrategy>,
        top_k: usize,
        discontinued_marker: impl Into<String>,
    ) -> Self {
        Self {
            index,
            backend,
            disambiguator,
            bundles,
            top_k,
            discontinued_marker: discontinued_marker.into(),
        }
    }

    pub fn bundle_mode(&self) -> BundleMode {
        self.bundles.mode()
    }

    pub async fn resolve(&self, request: &LineRequest) -> Result<Vec<OrderLine>, ResolutionError> {
        if request.quantity == 0 {
            return Ok(Vec::new());
        }
        match request.kind {
            LineKind::Item => self.resolve_item(&request.name, request.quantity).await,
            LineKind::Bundle => self.resolve_bundle(&request.name, request.quantity).await,
        }
    }

    async fn resolve_item(&self, query: &str, quantity: u32) -> Result<Vec<OrderLine>, ResolutionError> {
        let candidates = self.index.search_items(query, self.top_k);
        if candidates.is_empty() {
            return Err(ResolutionError::NotFound { query: query.to_string() });
        }

        let shortlist: Vec<Candidate> = candidates
            .iter()
            .map(|item| Candidate { id: item.id.0.clone(), name: item.name.clone() })
            .collect();
        let chosen = self.choose(query, &shortlist, DisambiguationDomain::Item).await?;
        let Some(item) = candidates.iter().find(|item| item.id.0 == chosen) else {
            return Err(ResolutionError::AmbiguousNoMatch { query: query.to_string() });
        };

        let detail = self
            .backend
            .fetch_item_detail(&item.id)
            .await
            .map_err(|source| ResolutionError::Backend { query: query.to_string(), source })?;

        info!(
            event_name = "cart.item.resolved",
            query,
            item_id = %item.id,
            item_name = %item.name,
            quantity,
            "item resolved"
        );
        allocate(&detail, quantity, &self.discontinued_marker, &LineOrigin::Item)
    }

    async fn resolve_bundle(
        &self,
        query: &str,
        quantity: u32,
    ) -> Result<Vec<OrderLine>, ResolutionError> {
        let shortlist = self.index.shortlist_bundles(query, self.top_k);
        if shortlist.candidates.is_empty() {
            return Err(ResolutionError::NotFound { query: query.to_string() });
        }

        let bundle = if shortlist.filtered && shortlist.candidates.len() == 1 {
            &shortlist.candidates[0]
        } else {
            let options: Vec<Candidate> = shortlist
                .candidates
                .iter()
                .map(|bundle| Candidate { id: bundle.id.0.clone(), name: bundle.name.clone() })
                .collect();
            let chosen = self.choose(query, &options, shortlist.domain).await?;
            match shortlist.candidates.iter().find(|bundle| bundle.id.0 == chosen) {
                Some(bundle) => bundle,
                None => return Err(ResolutionError::AmbiguousNoMatch { query: query.to_string() }),
            }
        };

        info!(
            event_name = "cart.bundle.resolved",
            query,
            bundle_id = %bundle.id,
            bundle_name = %bundle.name,
            category = bundle.category.as_str(),
            quantity,
            "bundle resolved"
        );
        self.bundles.lines(bundle, quantity, self.backend.as_ref()).await
    }

    async fn choose(
        &self,
        query: &str,
        candidates: &[Candidate],
        domain: DisambiguationDomain,
    ) -> Result<String, ResolutionError> {
        match self.disambiguator.select(query, candidates, domain).await {
            Disambiguation::Selected(id) if candidates.iter().any(|candidate| candidate.id == id) => {
                Ok(id)
            }
            Disambiguation::Selected(id) => {
                debug!(
                    event_name = "cart.disambiguation.foreign_id",
                    query,
                    id = %id,
                    "disambiguator answered with an id outside the candidate list"
                );
                Err(ResolutionError::AmbiguousNoMatch { query: query.to_string() })
            }
            Disambiguation::NoMatch => {
                Err(ResolutionError::AmbiguousNoMatch { query: query.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{CatalogItem, ItemId, Variant, VariantId};
    use crate::domain::order::{LineOrigin, SkuKey};
    use crate::errors::ResolutionError;

    use super::allocate;

    fn variant(id: &str, name: &str, stock: i64, held: i64) -> Variant {
        Variant {
            id: VariantId(id.to_string()),
            name: name.to_string(),
            price: Decimal::new(95_000, 0),
            stock,
            held,
        }
    }

    fn gin(variants: Vec<Variant>) -> CatalogItem {
        CatalogItem {
            id: ItemId("10".to_string()),
            name: "Gin Gordon's".to_string(),
            price: Decimal::new(90_000, 0),
            variants,
            hidden: false,
        }
    }

    #[test]
    fn items_without_variants_use_item_price() {
        let lines = allocate(&gin(Vec::new()), 3, "X", &LineOrigin::Item).expect("allocation");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].sku, SkuKey::item(ItemId("10".to_string())));
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].unit_price, Decimal::new(90_000, 0));
    }

    #[test]
    fn walk_skips_discontinued_empty_and_fully_held_variants() {
        let item = gin(vec![
            variant("v1", "X Old Batch", 50, 0),
            variant("v2", "Batch A", 0, 0),
            variant("v3", "Batch B", 4, 4),
            variant("v4", "Batch C", 2, 0),
            variant("v5", "Batch D", 10, 1),
        ]);

        let lines = allocate(&item, 5, "X", &LineOrigin::Item).expect("allocation");
        let taken: Vec<(String, u32)> = lines
            .iter()
            .map(|line| match &line.sku {
                SkuKey::Variant { variant_id, .. } => (variant_id.0.clone(), line.quantity),
                other => (other.to_string(), line.quantity),
            })
            .collect();
        assert_eq!(taken, vec![("v4".to_string(), 2), ("v5".to_string(), 3)]);
    }

    #[test]
    fn walk_stops_once_quantity_is_covered() {
        let item = gin(vec![variant("v1", "Batch A", 10, 0), variant("v2", "Batch B", 10, 0)]);
        let lines = allocate(&item, 4, "X", &LineOrigin::Item).expect("allocation");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 4);
    }

    #[test]
    fn shortfall_is_reported_with_the_product_name() {
        let item = gin(vec![variant("v1", "Batch A", 2, 0), variant("v2", "Batch B", 1, 0)]);
        let error = allocate(&item, 5, "X", &LineOrigin::Item).expect_err("insufficient stock");
        assert_eq!(
            error,
            ResolutionError::InsufficientStock { product: "Gin Gordon's".to_string(), shortfall: 2 }
        );
    }
}
