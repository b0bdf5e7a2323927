pub mod rules;
pub mod search;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::catalog::rules::CategoryRules;
use crate::catalog::search::{top_k, Bm25Params};
use crate::domain::catalog::{CatalogBundle, CatalogItem, CatalogSnapshot};
use crate::ports::DisambiguationDomain;

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("could not read catalog snapshot `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog snapshot `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not write catalog snapshot `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

pub fn read_snapshot(path: &Path) -> Result<CatalogSnapshot, CatalogLoadError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| CatalogLoadError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_str(&raw)
        .map_err(|source| CatalogLoadError::Parse { path: path.to_path_buf(), source })
}

pub fn write_snapshot(path: &Path, snapshot: &CatalogSnapshot) -> Result<(), CatalogLoadError> {
    let encoded = serde_json::to_string_pretty(snapshot).map_err(|source| {
        CatalogLoadError::Write { path: path.to_path_buf(), source: source.into() }
    })?;
    fs::write(path, encoded)
        .map_err(|source| CatalogLoadError::Write { path: path.to_path_buf(), source })
}

/// Bundles eligible for a bundle query, plus the instruction set to
/// disambiguate them with.
#[derive(Clone, Debug)]
pub struct BundleShortlist {
    pub domain: DisambiguationDomain,
    pub candidates: Vec<CatalogBundle>,
    /// Set when a category rule narrowed the catalog.
    pub filtered: bool,
}

/// Read-mostly view of the catalog. Refreshes swap the whole snapshot, so a
/// resolution run never sees a half-updated catalog.
pub struct CatalogIndex {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    rules: CategoryRules,
    params: Bm25Params,
}

impl CatalogIndex {
    pub fn new(snapshot: CatalogSnapshot, rules: CategoryRules) -> Self {
        let snapshot = classify(snapshot, &rules);
        Self { snapshot: RwLock::new(Arc::new(snapshot)), rules, params: Bm25Params::default() }
    }

    pub fn load(path: &Path, rules: CategoryRules) -> Result<Self, CatalogLoadError> {
        Ok(Self::new(read_snapshot(path)?, rules))
    }

    pub fn replace(&self, snapshot: CatalogSnapshot) {
        let snapshot = Arc::new(classify(snapshot, &self.rules));
        match self.snapshot.write() {
            Ok(mut current) => *current = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    pub fn reload(&self, path: &Path) -> Result<(), CatalogLoadError> {
        self.replace(read_snapshot(path)?);
        Ok(())
    }

    pub fn current(&self) -> Arc<CatalogSnapshot> {
        match self.snapshot.read() {
            Ok(current) => Arc::clone(&current),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn rules(&self) -> &CategoryRules {
        &self.rules
    }

    /// Top-`k` visible items for a free-text name.
    pub fn search_items(&self, query: &str, k: usize) -> Vec<CatalogItem> {
        let snapshot = self.current();
        let visible: Vec<&CatalogItem> =
            snapshot.items.iter().filter(|item| !item.hidden).collect();
        top_k(query, &visible, k, |item| item.name.as_str(), self.params)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Visible bundles narrowed by the first category rule the query
    /// triggers. Unfiltered shortlists are cut to the top `k` lexical hits.
    pub fn shortlist_bundles(&self, query: &str, k: usize) -> BundleShortlist {
        let snapshot = self.current();
        let visible = snapshot.bundles.iter().filter(|bundle| !bundle.hidden);

        match self.rules.rule_for_query(query) {
            Some(rule) => {
                let matching: Vec<&CatalogBundle> =
                    visible.filter(|bundle| rule.matcher.matches(&bundle.name)).collect();
                let ranked = if matching.len() > 1 {
                    top_k(query, &matching, k, |bundle| bundle.name.as_str(), self.params)
                } else {
                    matching
                };
                BundleShortlist {
                    domain: DisambiguationDomain::Bundle(rule.category),
                    candidates: ranked.into_iter().cloned().collect(),
                    filtered: true,
                }
            }
            None => {
                let all: Vec<&CatalogBundle> = visible.collect();
                BundleShortlist {
                    domain: DisambiguationDomain::Bundle(Default::default()),
                    candidates: top_k(query, &all, k, |bundle| bundle.name.as_str(), self.params)
                        .into_iter()
                        .cloned()
                        .collect(),
                    filtered: false,
                }
            }
        }
    }

    pub fn item_count(&self) -> usize {
        self.current().items.len()
    }

    pub fn bundle_count(&self) -> usize {
        self.current().bundles.len()
    }
}

fn classify(mut snapshot: CatalogSnapshot, rules: &CategoryRules) -> CatalogSnapshot {
    for bundle in &mut snapshot.bundles {
        bundle.category = rules.classify(&bundle.name);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use crate::catalog::rules::CategoryRules;
    use crate::domain::catalog::{
        BundleCategory, BundleId, CatalogBundle, CatalogItem, CatalogSnapshot, ItemId,
    };
    use crate::ports::DisambiguationDomain;

    use super::{read_snapshot, write_snapshot, CatalogIndex};

    fn item(id: &str, name: &str, hidden: bool) -> CatalogItem {
        CatalogItem {
            id: ItemId(id.to_string()),
            name: name.to_string(),
            price: Decimal::new(50_000, 0),
            variants: Vec::new(),
            hidden,
        }
    }

    fn bundle(id: &str, name: &str) -> CatalogBundle {
        CatalogBundle {
            id: BundleId(id.to_string()),
            name: name.to_string(),
            price: Decimal::new(100_000, 0),
            components: Vec::new(),
            hidden: false,
            category: BundleCategory::Plain,
        }
    }

    fn index() -> CatalogIndex {
        CatalogIndex::new(
            CatalogSnapshot {
                items: vec![
                    item("1", "Gin Gordon's 750ml", false),
                    item("2", "Gin Bombay Sapphire", true),
                    item("3", "Vodka Absolut", false),
                ],
                bundles: vec![
                    bundle("b1", "Merch Babe 1"),
                    bundle("b2", "Merch Babe 2"),
                    bundle("b3", "Paket Party Gin"),
                    bundle("b4", "Babe Garansi-in !!!"),
                    bundle("b5", "Merch Kaos Babe"),
                    bundle("b6", "Merch Topi"),
                ],
                synced_at: None,
            },
            CategoryRules::default(),
        )
    }

    #[test]
    fn hidden_items_are_never_candidates() {
        let hits = index().search_items("gin bombay", 10);
        assert!(hits.iter().all(|hit| hit.id.0 != "2"));
        assert_eq!(hits[0].id.0, "1");
    }

    #[test]
    fn category_prefix_restricts_the_bundle_shortlist() {
        let shortlist = index().shortlist_bundles("merch babe 2", 100);
        assert!(shortlist.filtered);
        assert_eq!(shortlist.domain, DisambiguationDomain::Bundle(BundleCategory::Merch));
        assert_eq!(shortlist.candidates.len(), 4);
        assert_eq!(shortlist.candidates[0].id.0, "b2");
    }

    #[test]
    fn guarantee_shortlist_holds_the_single_exact_bundle() {
        let shortlist = index().shortlist_bundles("garansi", 100);
        assert_eq!(shortlist.candidates.len(), 1);
        assert_eq!(shortlist.candidates[0].category, BundleCategory::Guarantee);
    }

    #[test]
    fn unfiltered_queries_search_the_whole_bundle_catalog() {
        let shortlist = index().shortlist_bundles("paket party", 2);
        assert!(!shortlist.filtered);
        assert_eq!(shortlist.candidates.len(), 2);
        assert_eq!(shortlist.candidates[0].id.0, "b3");
    }

    #[test]
    fn replace_swaps_the_snapshot_atomically() {
        let index = index();
        let before = index.current();
        index.replace(CatalogSnapshot::default());

        assert_eq!(before.items.len(), 3);
        assert_eq!(index.item_count(), 0);
        assert!(index.search_items("gin", 5).is_empty());
    }

    #[test]
    fn snapshots_round_trip_through_disk() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err| err.to_string())?;
        let path = dir.path().join("catalog.json");
        let snapshot = CatalogSnapshot {
            items: vec![item("9", "Tonic Water", false)],
            bundles: Vec::new(),
            synced_at: None,
        };

        write_snapshot(&path, &snapshot).map_err(|err| err.to_string())?;
        let loaded = read_snapshot(&path).map_err(|err| err.to_string())?;
        if loaded != snapshot {
            return Err("snapshot changed on disk".to_string());
        }
        Ok(())
    }
}
