//! Bearer token cache shared between the token refresher and the gateway.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use kasir_core::errors::BackendError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("could not read token cache `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write token cache `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("token cache `{path}` is malformed: {detail}")]
    Malformed { path: PathBuf, detail: String },
    #[error("token exchange failed: {0}")]
    Exchange(String),
}

/// On-disk shape of the token cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Reads the cached token on every call so a refresher running in another
/// process is picked up without restarts.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<TokenCache, TokenError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| TokenError::Read { path: self.path.clone(), source })?;
        serde_json::from_str(&raw).map_err(|error| TokenError::Malformed {
            path: self.path.clone(),
            detail: error.to_string(),
        })
    }

    pub fn bearer(&self) -> Result<SecretString, BackendError> {
        let cache = self.load().map_err(|error| BackendError::Credentials(error.to_string()))?;
        let token = cache.access_token.trim();
        if token.is_empty() {
            return Err(BackendError::Credentials(format!(
                "token cache `{}` holds an empty access token",
                self.path.display()
            )));
        }
        Ok(SecretString::from(token.to_string()))
    }

    pub fn store(&self, cache: &TokenCache) -> Result<(), TokenError> {
        let encoded = serde_json::to_string(cache).map_err(|error| TokenError::Malformed {
            path: self.path.clone(),
            detail: error.to_string(),
        })?;
        fs::write(&self.path, encoded)
            .map_err(|source| TokenError::Write { path: self.path.clone(), source })
    }
}

/// The token endpoint lives beside the language-scoped API root:
/// `.../v1/en` becomes `.../v1/id/token`.
pub fn token_url(api_base_url: &str) -> String {
    let trimmed = api_base_url.trim_end_matches('/');
    let root = match trimmed.rsplit_once('/') {
        Some((root, last)) if last.len() == 2 && last.chars().all(|c| c.is_ascii_alphabetic()) => root,
        _ => trimmed,
    };
    format!("{root}/id/token")
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

/// Exchanges the app credentials for a fresh bearer token.
pub async fn exchange_token(
    client: &Client,
    api_base_url: &str,
    app_id: &str,
    app_secret: &SecretString,
) -> Result<TokenCache, TokenError> {
    let url = token_url(api_base_url);
    let response = client
        .post(&url)
        .query(&[
            ("app_id", app_id),
            ("secret_key", app_secret.expose_secret()),
            ("grant_type", "secret_key"),
        ])
        .send()
        .await
        .map_err(|error| TokenError::Exchange(format!("request failed: {error}")))?;

    if !response.status().is_success() {
        return Err(TokenError::Exchange(format!("token endpoint returned {}", response.status())));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|error| TokenError::Exchange(format!("undecodable token response: {error}")))?;
    if token.access_token.trim().is_empty() {
        return Err(TokenError::Exchange("token endpoint returned an empty access token".to_string()));
    }

    info!(event_name = "gateway.token.exchanged", token_url = %url, "bearer token refreshed");
    Ok(TokenCache { access_token: token.access_token, timestamp: Some(Utc::now().to_rfc3339()) })
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use kasir_core::errors::BackendError;

    use super::{token_url, TokenCache, TokenStore};

    #[test]
    fn token_url_is_derived_from_the_api_root() {
        assert_eq!(
            token_url("https://api-open.olsera.co.id/api/open-api/v1/en"),
            "https://api-open.olsera.co.id/api/open-api/v1/id/token"
        );
        assert_eq!(token_url("http://localhost:9000/v1/en/"), "http://localhost:9000/v1/id/token");
        assert_eq!(token_url("http://localhost:9000/api"), "http://localhost:9000/api/id/token");
    }

    #[test]
    fn cache_written_by_the_refresher_is_readable() {
        let dir = TempDir::new().expect("temp dir");
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        store
            .store(&TokenCache { access_token: "abc".to_string(), timestamp: None })
            .expect("write cache");

        let bearer = store.bearer().expect("bearer");
        assert_eq!(bearer.expose_secret(), "abc");
    }

    #[test]
    fn legacy_cache_with_naive_timestamp_is_accepted() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("token_cache.json");
        std::fs::write(&path, r#"{"access_token": "xyz", "timestamp": "2026-03-14T10:00:00.123456"}"#)
            .expect("seed cache");

        let cache = TokenStore::new(&path).load().expect("load");
        assert_eq!(cache.access_token, "xyz");
    }

    #[test]
    fn missing_or_empty_tokens_are_credential_errors() {
        let dir = TempDir::new().expect("temp dir");
        let store = TokenStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.bearer(), Err(BackendError::Credentials(_))));

        store
            .store(&TokenCache { access_token: "  ".to_string(), timestamp: None })
            .expect("write cache");
        assert!(matches!(store.bearer(), Err(BackendError::Credentials(_))));
    }
}
