use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::PaymentMethod;
use crate::policy::{AccessoryPolicy, DeliveryPolicy, EtaPolicy};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pos: PosConfig,
    pub llm: LlmConfig,
    pub maps: MapsConfig,
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PosConfig {
    pub base_url: String,
    pub token_cache_path: PathBuf,
    pub app_id: Option<String>,
    pub app_secret: Option<SecretString>,
    pub receipt_base_url: String,
    pub store_slug: String,
    pub customer_type_id: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MapsConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub max_distance_km: f64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub utc_offset_hours: i32,
    pub payment_modes: PaymentModeIndices,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub bundle_mode: BundleMode,
    pub top_k: usize,
    pub discontinued_marker: String,
    pub request_delay_ms: u64,
    pub catalog_path: PathBuf,
    pub delivery: DeliveryPolicy,
    pub accessories: AccessoryPolicy,
    pub eta: EtaPolicy,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub fallback_wait_secs: u64,
    pub fallback_message: String,
    pub broadcast_groups: Vec<String>,
    pub broadcast_gap_ms: u64,
    /// Endpoint receiving outbound `send_message` payloads; logged only when unset.
    pub outbound_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Gemini,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleMode {
    /// Bundles are committed as one line; the backend prorates.
    Opaque,
    /// Bundles are expanded into stock-checked, prorated component lines.
    Expanded,
}

/// Index of each payment method in the backend's payment-mode list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentModeIndices {
    pub cash: usize,
    pub bri: usize,
    pub credit: usize,
    pub bca: usize,
    pub qris: usize,
}

impl Default for PaymentModeIndices {
    fn default() -> Self {
        Self { cash: 0, bri: 1, credit: 2, bca: 3, qris: 4 }
    }
}

impl PaymentModeIndices {
    pub fn index_of(&self, method: PaymentMethod) -> usize {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::Bri => self.bri,
            PaymentMethod::Credit => self.credit,
            PaymentMethod::Bca => self.bca,
            PaymentMethod::Qris => self.qris,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub bundle_mode: Option<BundleMode>,
    pub catalog_path: Option<PathBuf>,
    pub token_cache_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://kasir.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            pos: PosConfig {
                base_url: "https://api-open.olsera.co.id/api/open-api/v1/en".to_string(),
                token_cache_path: PathBuf::from("token_cache.json"),
                app_id: None,
                app_secret: None,
                receipt_base_url: "https://invoice.olsera.co.id/pos-receipt".to_string(),
                store_slug: "kulkasbabe".to_string(),
                customer_type_id: "195972".to_string(),
                timeout_secs: 20,
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                base_url: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
                model: "gemini-2.0-flash".to_string(),
                timeout_secs: 30,
            },
            maps: MapsConfig {
                api_key: None,
                base_url: "https://maps.googleapis.com/maps/api".to_string(),
                max_distance_km: 45.0,
                timeout_secs: 15,
            },
            store: StoreConfig {
                latitude: -7.560745951139057,
                longitude: 110.8493297202405,
                utc_offset_hours: 7,
                payment_modes: PaymentModeIndices::default(),
            },
            engine: EngineConfig {
                bundle_mode: BundleMode::Opaque,
                top_k: 100,
                discontinued_marker: "X".to_string(),
                request_delay_ms: 1_000,
                catalog_path: PathBuf::from("catalog.json"),
                delivery: DeliveryPolicy::default(),
                accessories: AccessoryPolicy::default(),
                eta: EtaPolicy::default(),
            },
            relay: RelayConfig {
                fallback_wait_secs: 30,
                fallback_message: "Order received, still processing. The receipt follows shortly."
                    .to_string(),
                broadcast_groups: Vec::new(),
                broadcast_gap_ms: 1_000,
                outbound_url: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected gemini|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for BundleMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "opaque" => Ok(Self::Opaque),
            "expanded" => Ok(Self::Expanded),
            other => Err(ConfigError::Validation(format!(
                "unsupported bundle mode `{other}` (expected opaque|expanded)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kasir.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(pos) = patch.pos {
            if let Some(base_url) = pos.base_url {
                self.pos.base_url = base_url;
            }
            if let Some(token_cache_path) = pos.token_cache_path {
                self.pos.token_cache_path = token_cache_path;
            }
            if let Some(app_id) = pos.app_id {
                self.pos.app_id = Some(app_id);
            }
            if let Some(app_secret) = pos.app_secret {
                self.pos.app_secret = Some(secret_value(app_secret));
            }
            if let Some(receipt_base_url) = pos.receipt_base_url {
                self.pos.receipt_base_url = receipt_base_url;
            }
            if let Some(store_slug) = pos.store_slug {
                self.pos.store_slug = store_slug;
            }
            if let Some(customer_type_id) = pos.customer_type_id {
                self.pos.customer_type_id = customer_type_id;
            }
            if let Some(timeout_secs) = pos.timeout_secs {
                self.pos.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(maps) = patch.maps {
            if let Some(api_key) = maps.api_key {
                self.maps.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = maps.base_url {
                self.maps.base_url = base_url;
            }
            if let Some(max_distance_km) = maps.max_distance_km {
                self.maps.max_distance_km = max_distance_km;
            }
            if let Some(timeout_secs) = maps.timeout_secs {
                self.maps.timeout_secs = timeout_secs;
            }
        }

        if let Some(store) = patch.store {
            if let Some(latitude) = store.latitude {
                self.store.latitude = latitude;
            }
            if let Some(longitude) = store.longitude {
                self.store.longitude = longitude;
            }
            if let Some(utc_offset_hours) = store.utc_offset_hours {
                self.store.utc_offset_hours = utc_offset_hours;
            }
            if let Some(payment_modes) = store.payment_modes {
                self.store.payment_modes = payment_modes;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(bundle_mode) = engine.bundle_mode {
                self.engine.bundle_mode = bundle_mode;
            }
            if let Some(top_k) = engine.top_k {
                self.engine.top_k = top_k;
            }
            if let Some(discontinued_marker) = engine.discontinued_marker {
                self.engine.discontinued_marker = discontinued_marker;
            }
            if let Some(request_delay_ms) = engine.request_delay_ms {
                self.engine.request_delay_ms = request_delay_ms;
            }
            if let Some(catalog_path) = engine.catalog_path {
                self.engine.catalog_path = catalog_path;
            }
            if let Some(delivery) = engine.delivery {
                self.engine.delivery = delivery;
            }
            if let Some(accessories) = engine.accessories {
                self.engine.accessories = accessories;
            }
            if let Some(eta) = engine.eta {
                self.engine.eta = eta;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(fallback_wait_secs) = relay.fallback_wait_secs {
                self.relay.fallback_wait_secs = fallback_wait_secs;
            }
            if let Some(fallback_message) = relay.fallback_message {
                self.relay.fallback_message = fallback_message;
            }
            if let Some(broadcast_groups) = relay.broadcast_groups {
                self.relay.broadcast_groups = broadcast_groups;
            }
            if let Some(broadcast_gap_ms) = relay.broadcast_gap_ms {
                self.relay.broadcast_gap_ms = broadcast_gap_ms;
            }
            if let Some(outbound_url) = relay.outbound_url {
                self.relay.outbound_url = Some(outbound_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KASIR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KASIR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("KASIR_DATABASE_MAX_CONNECTIONS", &value)?;
        }

        if let Some(value) = read_env("KASIR_POS_BASE_URL") {
            self.pos.base_url = value;
        }
        if let Some(value) = read_env("KASIR_POS_TOKEN_CACHE_PATH") {
            self.pos.token_cache_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("KASIR_POS_APP_ID") {
            self.pos.app_id = Some(value);
        }
        if let Some(value) = read_env("KASIR_POS_APP_SECRET") {
            self.pos.app_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("KASIR_POS_STORE_SLUG") {
            self.pos.store_slug = value;
        }

        if let Some(value) = read_env("KASIR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("KASIR_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("KASIR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("KASIR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("KASIR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("KASIR_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KASIR_MAPS_API_KEY") {
            self.maps.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("KASIR_MAPS_MAX_DISTANCE_KM") {
            self.maps.max_distance_km = parse_f64("KASIR_MAPS_MAX_DISTANCE_KM", &value)?;
        }

        if let Some(value) = read_env("KASIR_ENGINE_BUNDLE_MODE") {
            self.engine.bundle_mode = value.parse()?;
        }
        if let Some(value) = read_env("KASIR_ENGINE_TOP_K") {
            self.engine.top_k = parse_usize("KASIR_ENGINE_TOP_K", &value)?;
        }
        if let Some(value) = read_env("KASIR_ENGINE_REQUEST_DELAY_MS") {
            self.engine.request_delay_ms = parse_u64("KASIR_ENGINE_REQUEST_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("KASIR_ENGINE_CATALOG_PATH") {
            self.engine.catalog_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("KASIR_RELAY_FALLBACK_WAIT_SECS") {
            self.relay.fallback_wait_secs = parse_u64("KASIR_RELAY_FALLBACK_WAIT_SECS", &value)?;
        }
        if let Some(value) = read_env("KASIR_RELAY_OUTBOUND_URL") {
            self.relay.outbound_url = Some(value);
        }
        if let Some(value) = read_env("KASIR_RELAY_BROADCAST_GROUPS") {
            self.relay.broadcast_groups = value
                .split(',')
                .map(str::trim)
                .filter(|group| !group.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("KASIR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KASIR_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("KASIR_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("KASIR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("KASIR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("KASIR_LOGGING_LEVEL").or_else(|| read_env("KASIR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("KASIR_LOGGING_FORMAT").or_else(|| read_env("KASIR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(bundle_mode) = overrides.bundle_mode {
            self.engine.bundle_mode = bundle_mode;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.engine.catalog_path = catalog_path;
        }
        if let Some(token_cache_path) = overrides.token_cache_path {
            self.pos.token_cache_path = token_cache_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pos(&self.pos)?;
        validate_llm(&self.llm)?;
        validate_maps(&self.maps)?;
        validate_store(&self.store)?;
        validate_engine(&self.engine)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kasir.toml"), PathBuf::from("config/kasir.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_pos(pos: &PosConfig) -> Result<(), ConfigError> {
    validate_http_url("pos.base_url", &pos.base_url)?;
    validate_http_url("pos.receipt_base_url", &pos.receipt_base_url)?;

    if pos.store_slug.trim().is_empty() {
        return Err(ConfigError::Validation("pos.store_slug must not be empty".to_string()));
    }

    if pos.timeout_secs == 0 || pos.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "pos.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let has_id = pos.app_id.as_ref().map(|id| !id.trim().is_empty()).unwrap_or(false);
    let has_secret =
        pos.app_secret.as_ref().map(|secret| !secret.expose_secret().is_empty()).unwrap_or(false);
    if has_id != has_secret {
        return Err(ConfigError::Validation(
            "pos.app_id and pos.app_secret must be configured together".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Gemini | LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for gemini/openai providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_maps(maps: &MapsConfig) -> Result<(), ConfigError> {
    validate_http_url("maps.base_url", &maps.base_url)?;

    if maps.max_distance_km.is_nan() || maps.max_distance_km <= 0.0 {
        return Err(ConfigError::Validation(
            "maps.max_distance_km must be greater than zero".to_string(),
        ));
    }

    if maps.timeout_secs == 0 || maps.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "maps.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if !(-90.0..=90.0).contains(&store.latitude) || !(-180.0..=180.0).contains(&store.longitude) {
        return Err(ConfigError::Validation(
            "store.latitude/longitude must be valid coordinates".to_string(),
        ));
    }

    if !(-12..=14).contains(&store.utc_offset_hours) {
        return Err(ConfigError::Validation(
            "store.utc_offset_hours must be in range -12..=14".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.top_k == 0 {
        return Err(ConfigError::Validation("engine.top_k must be greater than zero".to_string()));
    }

    if engine.request_delay_ms > 10_000 {
        return Err(ConfigError::Validation(
            "engine.request_delay_ms must be at most 10000".to_string(),
        ));
    }

    engine
        .delivery
        .validate()
        .map_err(|message| ConfigError::Validation(format!("engine.delivery: {message}")))?;
    engine
        .accessories
        .validate()
        .map_err(|message| ConfigError::Validation(format!("engine.accessories: {message}")))?;
    engine
        .eta
        .validate()
        .map_err(|message| ConfigError::Validation(format!("engine.eta: {message}")))?;

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pos: Option<PosPatch>,
    llm: Option<LlmPatch>,
    maps: Option<MapsPatch>,
    store: Option<StorePatch>,
    engine: Option<EnginePatch>,
    relay: Option<RelayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PosPatch {
    base_url: Option<String>,
    token_cache_path: Option<PathBuf>,
    app_id: Option<String>,
    app_secret: Option<String>,
    receipt_base_url: Option<String>,
    store_slug: Option<String>,
    customer_type_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MapsPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    max_distance_km: Option<f64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    latitude: Option<f64>,
    longitude: Option<f64>,
    utc_offset_hours: Option<i32>,
    payment_modes: Option<PaymentModeIndices>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    bundle_mode: Option<BundleMode>,
    top_k: Option<usize>,
    discontinued_marker: Option<String>,
    request_delay_ms: Option<u64>,
    catalog_path: Option<PathBuf>,
    delivery: Option<DeliveryPolicy>,
    accessories: Option<AccessoryPolicy>,
    eta: Option<EtaPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    fallback_wait_secs: Option<u64>,
    fallback_message: Option<String>,
    broadcast_groups: Option<Vec<String>>,
    broadcast_gap_ms: Option<u64>,
    outbound_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
