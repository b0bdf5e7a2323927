use std::sync::Arc;
use std::time::Duration;

use kasir_gateway::{http_client, CatalogSync, OlseraClient};

use crate::commands::{block_on, load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("catalog-sync") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let http = match http_client(config.pos.timeout_secs) {
        Ok(http) => http,
        Err(error) => return CommandResult::failure("catalog-sync", "http_client", error.to_string(), 3),
    };

    let backend = Arc::new(OlseraClient::new(http, &config.pos));
    let sync = CatalogSync::new(backend, Duration::from_millis(config.engine.request_delay_ms));
    let path = config.engine.catalog_path.clone();

    match block_on("catalog-sync", sync.run(&path)) {
        Ok(Ok(summary)) => CommandResult::success(
            "catalog-sync",
            format!(
                "wrote {} items and {} bundles from {} pages to `{}`",
                summary.items,
                summary.bundles,
                summary.pages,
                path.display()
            ),
        ),
        Ok(Err(error)) => CommandResult::failure("catalog-sync", "sync", error.to_string(), 6),
        Err(failure) => failure,
    }
}
