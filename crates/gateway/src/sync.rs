//! One-shot catalog sync: pages through the backend listings and writes the
//! snapshot the catalog index loads.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use kasir_core::catalog::{write_snapshot, CatalogLoadError};
use kasir_core::domain::catalog::CatalogSnapshot;
use kasir_core::errors::BackendError;
use kasir_core::ports::{CatalogKind, PosBackend};

const MAX_PAGES: u32 = 500;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog listing failed on page {page}: {source}")]
    Backend { page: u32, source: BackendError },
    #[error(transparent)]
    Write(#[from] CatalogLoadError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSummary {
    pub items: usize,
    pub bundles: usize,
    pub pages: u32,
}

pub struct CatalogSync {
    backend: Arc<dyn PosBackend>,
    request_delay: Duration,
}

impl CatalogSync {
    pub fn new(backend: Arc<dyn PosBackend>, request_delay: Duration) -> Self {
        Self { backend, request_delay }
    }

    pub async fn fetch(&self) -> Result<(CatalogSnapshot, u32), SyncError> {
        let mut snapshot = CatalogSnapshot::default();
        let mut pages = 0;
        for kind in [CatalogKind::Items, CatalogKind::Bundles] {
            let mut page = 1;
            while page <= MAX_PAGES {
                if pages > 0 && !self.request_delay.is_zero() {
                    tokio::time::sleep(self.request_delay).await;
                }
                let listing = self
                    .backend
                    .list_catalog_page(kind, page)
                    .await
                    .map_err(|source| SyncError::Backend { page, source })?;
                pages += 1;

                let fetched = listing.items.len() + listing.bundles.len();
                snapshot.items.extend(listing.items);
                snapshot.bundles.extend(listing.bundles);
                let last_reached = listing.last_page != 0 && page >= listing.last_page;
                if fetched == 0 || last_reached {
                    break;
                }
                page += 1;
            }
        }
        snapshot.synced_at = Some(Utc::now());
        Ok((snapshot, pages))
    }

    pub async fn run(&self, path: &Path) -> Result<SyncSummary, SyncError> {
        let (snapshot, pages) = self.fetch().await?;
        write_snapshot(path, &snapshot)?;
        let summary = SyncSummary { items: snapshot.items.len(), bundles: snapshot.bundles.len(), pages };
        info!(
            event_name = "gateway.catalog.synced",
            items = summary.items,
            bundles = summary.bundles,
            pages = summary.pages,
            path = %path.display(),
            "catalog snapshot written"
        );
        Ok(summary)
    }
}
