//! HTTP adapters for the POS backend and the maps service.

pub mod maps;
pub mod olsera;
pub mod sync;
pub mod token;

use std::time::Duration;

use reqwest::Client;

pub use maps::GoogleMapsGeocoder;
pub use olsera::OlseraClient;
pub use sync::{CatalogSync, SyncError, SyncSummary};
pub use token::{exchange_token, TokenCache, TokenError, TokenStore};

/// Shared HTTP client with a per-request timeout.
pub fn http_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()
}
