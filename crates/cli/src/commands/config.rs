use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kasir_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<(&str, String, Option<&str>)> = vec![
        ("database.url", config.database.url.clone(), Some("KASIR_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("KASIR_DATABASE_MAX_CONNECTIONS"),
        ),
        ("pos.base_url", config.pos.base_url.clone(), Some("KASIR_POS_BASE_URL")),
        ("pos.store_slug", config.pos.store_slug.clone(), Some("KASIR_POS_STORE_SLUG")),
        (
            "pos.token_cache_path",
            config.pos.token_cache_path.display().to_string(),
            Some("KASIR_POS_TOKEN_CACHE_PATH"),
        ),
        (
            "pos.app_id",
            config.pos.app_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("KASIR_POS_APP_ID"),
        ),
        ("pos.app_secret", redact_secret(config.pos.app_secret.as_ref()), Some("KASIR_POS_APP_SECRET")),
        ("llm.provider", format!("{:?}", config.llm.provider), Some("KASIR_LLM_PROVIDER")),
        ("llm.model", config.llm.model.clone(), Some("KASIR_LLM_MODEL")),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("KASIR_LLM_BASE_URL"),
        ),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref()), Some("KASIR_LLM_API_KEY")),
        ("maps.api_key", redact_secret(config.maps.api_key.as_ref()), Some("KASIR_MAPS_API_KEY")),
        (
            "maps.max_distance_km",
            config.maps.max_distance_km.to_string(),
            Some("KASIR_MAPS_MAX_DISTANCE_KM"),
        ),
        ("store.utc_offset_hours", config.store.utc_offset_hours.to_string(), None),
        ("engine.bundle_mode", format!("{:?}", config.engine.bundle_mode), Some("KASIR_ENGINE_BUNDLE_MODE")),
        ("engine.top_k", config.engine.top_k.to_string(), Some("KASIR_ENGINE_TOP_K")),
        (
            "engine.catalog_path",
            config.engine.catalog_path.display().to_string(),
            Some("KASIR_ENGINE_CATALOG_PATH"),
        ),
        (
            "engine.request_delay_ms",
            config.engine.request_delay_ms.to_string(),
            Some("KASIR_ENGINE_REQUEST_DELAY_MS"),
        ),
        (
            "relay.fallback_wait_secs",
            config.relay.fallback_wait_secs.to_string(),
            Some("KASIR_RELAY_FALLBACK_WAIT_SECS"),
        ),
        (
            "relay.outbound_url",
            config.relay.outbound_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("KASIR_RELAY_OUTBOUND_URL"),
        ),
        ("server.bind_address", config.server.bind_address.clone(), Some("KASIR_SERVER_BIND_ADDRESS")),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            Some("KASIR_SERVER_HEALTH_CHECK_PORT"),
        ),
        ("logging.level", config.logging.level.clone(), Some("KASIR_LOGGING_LEVEL")),
        ("logging.format", format!("{:?}", config.logging.format), Some("KASIR_LOGGING_FORMAT")),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source = field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["kasir.toml", "config/kasir.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim().len()) {
        None | Some(0) => "<unset>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
