use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use kasir_core::catalog::CatalogIndex;
use kasir_db::{ping, DbPool};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub catalog: Arc<CatalogIndex>,
    pub catalog_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub catalog: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/catalog/reload", post(reload_catalog))
        .with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, app: Router) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let catalog = catalog_check(&state.catalog);
    let ready = database.status == "ready" && catalog.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "kasir-server runtime initialized".to_string(),
        },
        database,
        catalog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Re-reads the snapshot written by `kasir catalog-sync`. A failed read
/// keeps serving the previous catalog.
pub async fn reload_catalog(State(state): State<HealthState>) -> (StatusCode, Json<HealthCheck>) {
    match state.catalog.reload(&state.catalog_path) {
        Ok(()) => {
            let check = catalog_check(&state.catalog);
            info!(event_name = "catalog.reloaded", detail = %check.detail, "catalog snapshot reloaded");
            (StatusCode::OK, Json(check))
        }
        Err(source) => {
            warn!(event_name = "catalog.reload_failed", error = %source, "catalog snapshot reload failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(HealthCheck { status: "failed", detail: source.to_string() }),
            )
        }
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "journal database reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("journal database unreachable: {error}") }
        }
    }
}

fn catalog_check(catalog: &CatalogIndex) -> HealthCheck {
    let snapshot = catalog.current();
    let detail = format!("{} items, {} bundles", snapshot.items.len(), snapshot.bundles.len());
    if snapshot.items.is_empty() && snapshot.bundles.is_empty() {
        HealthCheck { status: "empty", detail }
    } else {
        HealthCheck { status: "ready", detail }
    }
}
