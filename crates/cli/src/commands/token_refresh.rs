use kasir_gateway::{exchange_token, http_client, TokenStore};

use crate::commands::{block_on, load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("token-refresh") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let (Some(app_id), Some(app_secret)) = (config.pos.app_id.as_deref(), config.pos.app_secret.as_ref()) else {
        return CommandResult::failure(
            "token-refresh",
            "missing_credentials",
            "pos.app_id and pos.app_secret must be set (KASIR_POS_APP_ID / KASIR_POS_APP_SECRET)",
            2,
        );
    };
    let http = match http_client(config.pos.timeout_secs) {
        Ok(http) => http,
        Err(error) => return CommandResult::failure("token-refresh", "http_client", error.to_string(), 3),
    };

    let exchanged = block_on("token-refresh", exchange_token(&http, &config.pos.base_url, app_id, app_secret));
    let cache = match exchanged {
        Ok(Ok(cache)) => cache,
        Ok(Err(error)) => return CommandResult::failure("token-refresh", "token_exchange", error.to_string(), 6),
        Err(failure) => return failure,
    };

    let store = TokenStore::new(config.pos.token_cache_path.clone());
    match store.store(&cache) {
        Ok(()) => CommandResult::success(
            "token-refresh",
            format!("bearer token written to `{}`", store.path().display()),
        ),
        Err(error) => CommandResult::failure("token-refresh", "token_cache", error.to_string(), 7),
    }
}
