use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use kasir_cli::commands::{cancel, config, doctor, migrate, token_refresh};
use serde_json::Value;

const VALID_ENV: [(&str, &str); 2] =
    [("KASIR_DATABASE_URL", "sqlite::memory:"), ("KASIR_LLM_API_KEY", "test-llm-key")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_llm_key() {
    with_env(&[("KASIR_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_secrets_and_names_env_sources() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("KASIR_POS_APP_ID", "app-7"));
    vars.push(("KASIR_POS_APP_SECRET", "very-secret"));
    with_env(&vars, || {
        let output = config::run();
        assert!(output.contains("- llm.api_key = <redacted> (source: env (KASIR_LLM_API_KEY))"));
        assert!(output.contains("- pos.app_id = app-7 (source: env (KASIR_POS_APP_ID))"));
        assert!(output.contains("- pos.app_secret = <redacted>"));
        assert!(output.contains("- maps.api_key = <unset> (source: default)"));
        assert!(!output.contains("very-secret"));
        assert!(!output.contains("test-llm-key"));
    });
}

#[test]
fn doctor_reports_missing_token_cache_and_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let token_path = dir.path().join("token_cache.json");
    let catalog_path = dir.path().join("catalog.json");
    let token = token_path.display().to_string();
    let catalog = catalog_path.display().to_string();

    let mut vars = VALID_ENV.to_vec();
    vars.push(("KASIR_POS_TOKEN_CACHE_PATH", token.as_str()));
    vars.push(("KASIR_ENGINE_CATALOG_PATH", catalog.as_str()));
    with_env(&vars, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);
        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check_status(&report, "config_validation"), "pass");
        assert_eq!(check_status(&report, "database_connectivity"), "pass");
        assert_eq!(check_status(&report, "pos_token_cache"), "fail");
        assert_eq!(check_status(&report, "catalog_snapshot"), "fail");

        fs::write(&token_path, r#"{"access_token": "abc", "timestamp": "2026-03-14T08:00:00"}"#)
            .expect("token cache");
        fs::write(&catalog_path, r#"{"items": [], "bundles": []}"#).expect("catalog");
        let result = doctor::run(true);
        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass", "{}", result.output);
        assert_eq!(result.exit_code, 0);
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let report = parse_payload(&doctor::run(true).output);
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "catalog_snapshot"), "skipped");
    });
}

#[test]
fn cancel_without_a_token_cache_reports_each_order() {
    let dir = tempfile::tempdir().expect("temp dir");
    let token = dir.path().join("missing.json").display().to_string();

    let mut vars = VALID_ENV.to_vec();
    vars.push(("KASIR_POS_TOKEN_CACHE_PATH", token.as_str()));
    with_env(&vars, || {
        let result = cancel::run(&["SO-1".to_string(), "SO-2".to_string()]);
        assert_eq!(result.exit_code, 1, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "cancel_incomplete");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("No orders were cancelled."));
        assert!(message.contains("Failed to cancel SO-1"));
        assert!(message.contains("Failed to cancel SO-2"));
    });
}

#[test]
fn token_refresh_requires_app_credentials() {
    with_env(&VALID_ENV, || {
        let result = token_refresh::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "missing_credentials");
    });
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "KASIR_DATABASE_URL",
        "KASIR_DATABASE_MAX_CONNECTIONS",
        "KASIR_POS_BASE_URL",
        "KASIR_POS_APP_ID",
        "KASIR_POS_APP_SECRET",
        "KASIR_POS_STORE_SLUG",
        "KASIR_POS_TOKEN_CACHE_PATH",
        "KASIR_LLM_PROVIDER",
        "KASIR_LLM_API_KEY",
        "KASIR_LLM_BASE_URL",
        "KASIR_LLM_MODEL",
        "KASIR_LLM_TIMEOUT_SECS",
        "KASIR_MAPS_API_KEY",
        "KASIR_MAPS_MAX_DISTANCE_KM",
        "KASIR_ENGINE_BUNDLE_MODE",
        "KASIR_ENGINE_CATALOG_PATH",
        "KASIR_ENGINE_REQUEST_DELAY_MS",
        "KASIR_ENGINE_TOP_K",
        "KASIR_RELAY_FALLBACK_WAIT_SECS",
        "KASIR_RELAY_BROADCAST_GROUPS",
        "KASIR_RELAY_OUTBOUND_URL",
        "KASIR_SERVER_BIND_ADDRESS",
        "KASIR_SERVER_HEALTH_CHECK_PORT",
        "KASIR_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "KASIR_LOGGING_LEVEL",
        "KASIR_LOGGING_FORMAT",
        "KASIR_LOG_LEVEL",
        "KASIR_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
