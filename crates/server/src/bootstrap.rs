use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use kasir_agent::{
    build_client, AgentRuntime, GuardrailPolicy, LlmDisambiguator, LlmNotesSummarizer,
    LlmTranslator, RuntimeSettings,
};
use kasir_core::audit::AuditSink;
use kasir_core::catalog::rules::CategoryRules;
use kasir_core::catalog::{CatalogIndex, CatalogLoadError};
use kasir_core::commit::admin::OrderAdmin;
use kasir_core::commit::{CommitSettings, OrderCommitProtocol};
use kasir_core::config::{AppConfig, ConfigError, LoadOptions};
use kasir_core::domain::catalog::CatalogSnapshot;
use kasir_core::invoice::{InvoiceError, InvoiceRenderer};
use kasir_core::ports::{GeoPoint, PosBackend};
use kasir_core::{strategy_for, CatalogResolver};
use kasir_db::{
    connect_with_settings, migrations, DbPool, JournalAuditSink, SqlOrderJournalRepository,
};
use kasir_gateway::{http_client, GoogleMapsGeocoder, OlseraClient};
use kasir_relay::{
    channel_transport, Delivery, OutboundMessage, ReconnectPolicy, RelayRunner, RelaySettings,
    StaticGroupDirectory,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const INGRESS_CAPACITY: usize = 64;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<CatalogIndex>,
    pub relay: RelayRunner,
    /// Feeds the relay; held by the webhook endpoint.
    pub ingress: mpsc::Sender<Delivery>,
    /// Replies published by the relay, drained by the outbound forwarder.
    pub outbox: mpsc::UnboundedReceiver<OutboundMessage>,
    pub outbound_http: reqwest::Client,
    pub journal_writer: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("catalog snapshot could not be loaded: {0}")]
    Catalog(#[source] CatalogLoadError),
    #[error("llm client could not be built: {0}")]
    Llm(String),
    #[error("maps.api_key is required to geocode delivery addresses")]
    MissingMapsKey,
    #[error("store.utc_offset_hours `{0}` is not a valid offset")]
    UtcOffset(i32),
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let (journal, journal_writer) =
        JournalAuditSink::spawn(Arc::new(SqlOrderJournalRepository::new(db_pool.clone())));
    let audit: Arc<dyn AuditSink> = Arc::new(journal);

    let pos_http = http_client(config.pos.timeout_secs).map_err(BootstrapError::HttpClient)?;
    let llm_http = http_client(config.llm.timeout_secs).map_err(BootstrapError::HttpClient)?;
    let maps_http = http_client(config.maps.timeout_secs).map_err(BootstrapError::HttpClient)?;
    let outbound_http = http_client(config.pos.timeout_secs).map_err(BootstrapError::HttpClient)?;

    let backend: Arc<dyn PosBackend> = Arc::new(OlseraClient::new(pos_http, &config.pos));
    let catalog = Arc::new(load_catalog(&config.engine.catalog_path)?);

    let llm = build_client(llm_http, &config.llm)
        .map_err(|error| BootstrapError::Llm(error.to_string()))?;
    let maps_key = config.maps.api_key.clone().ok_or(BootstrapError::MissingMapsKey)?;
    let geocoder = Arc::new(GoogleMapsGeocoder::new(maps_http, &config.maps, maps_key));

    let engine = &config.engine;
    let request_delay = Duration::from_millis(engine.request_delay_ms);
    let resolver = CatalogResolver::new(
        catalog.clone(),
        backend.clone(),
        Arc::new(LlmDisambiguator::new(llm.clone())),
        strategy_for(engine.bundle_mode, &engine.discontinued_marker),
        engine.top_k,
        engine.discontinued_marker.clone(),
    );
    let protocol = OrderCommitProtocol::new(
        resolver,
        backend.clone(),
        audit.clone(),
        CommitSettings {
            request_delay,
            payment_modes: config.store.payment_modes,
            delivery: engine.delivery.clone(),
            accessories: engine.accessories.clone(),
        },
    );
    let admin = OrderAdmin::new(backend, audit.clone(), request_delay);
    let invoice = InvoiceRenderer::new(engine.eta.clone())?;

    let utc_offset = FixedOffset::east_opt(config.store.utc_offset_hours * 3600)
        .ok_or(BootstrapError::UtcOffset(config.store.utc_offset_hours))?;
    let runtime = Arc::new(AgentRuntime::new(
        Arc::new(LlmTranslator::new(llm.clone())),
        geocoder,
        Arc::new(LlmNotesSummarizer::new(llm)),
        protocol,
        admin,
        invoice,
        audit,
        GuardrailPolicy::default(),
        RuntimeSettings {
            store: GeoPoint { latitude: config.store.latitude, longitude: config.store.longitude },
            max_distance_km: config.maps.max_distance_km,
            utc_offset,
        },
    ));
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        bundle_mode = ?engine.bundle_mode,
        llm_provider = ?config.llm.provider,
        "order runtime initialized"
    );

    let (transport, ingress, outbox) = channel_transport(INGRESS_CAPACITY);
    let relay = RelayRunner::new(
        Arc::new(transport),
        runtime,
        Arc::new(StaticGroupDirectory::new(config.relay.broadcast_groups.clone())),
        RelaySettings::from(&config.relay),
        ReconnectPolicy::default(),
    );

    Ok(Application {
        config,
        db_pool,
        catalog,
        relay,
        ingress,
        outbox,
        outbound_http,
        journal_writer,
    })
}

/// A missing snapshot starts the service with an empty catalog so that
/// `kasir catalog-sync` can populate it later; an unreadable one is fatal.
fn load_catalog(path: &Path) -> Result<CatalogIndex, BootstrapError> {
    match CatalogIndex::load(path, CategoryRules::default()) {
        Ok(index) => {
            info!(
                event_name = "system.bootstrap.catalog_loaded",
                correlation_id = "bootstrap",
                path = %path.display(),
                items = index.item_count(),
                bundles = index.current().bundles.len(),
                "catalog snapshot loaded"
            );
            Ok(index)
        }
        Err(CatalogLoadError::Read { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            warn!(
                event_name = "system.bootstrap.catalog_missing",
                correlation_id = "bootstrap",
                path = %path.display(),
                "catalog snapshot not found; starting with an empty catalog"
            );
            Ok(CatalogIndex::new(CatalogSnapshot::default(), CategoryRules::default()))
        }
        Err(error) => Err(BootstrapError::Catalog(error)),
    }
}
