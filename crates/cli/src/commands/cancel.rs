use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use kasir_core::commit::admin::{CancelReport, OrderAdmin};
use kasir_core::config::AppConfig;
use kasir_db::{connect_with_settings, migrations, JournalAuditSink, SqlOrderJournalRepository};
use kasir_gateway::{http_client, OlseraClient};

use crate::commands::{block_on, load_config, CommandResult};

pub fn run(order_numbers: &[String]) -> CommandResult {
    let config = match load_config("cancel") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let correlation_id = format!("cli-cancel-{}", Utc::now().timestamp());

    let result = block_on("cancel", async {
        with_admin(&config, |admin| async move {
            Ok(admin.cancel_by_numbers(order_numbers, &correlation_id).await)
        })
        .await
    });
    finish("cancel", result)
}

pub fn run_clear_open() -> CommandResult {
    let config = match load_config("clear-open") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let offset = FixedOffset::east_opt(config.store.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix());
    let today = Utc::now().with_timezone(&offset).date_naive();
    let correlation_id = format!("cli-clear-open-{}", Utc::now().timestamp());

    let result = block_on("clear-open", async {
        with_admin(&config, |admin| async move {
            admin
                .cancel_all_open(today, &correlation_id)
                .await
                .map_err(|error| ("backend", error.to_string(), 6u8))
        })
        .await
    });
    finish("clear-open", result)
}

type Failure = (&'static str, String, u8);

/// Runs `operation` with an admin whose audit events land in the journal,
/// then waits for the journal writer to drain.
async fn with_admin<F, Fut>(config: &AppConfig, operation: F) -> Result<CancelReport, Failure>
where
    F: FnOnce(OrderAdmin) -> Fut,
    Fut: std::future::Future<Output = Result<CancelReport, Failure>>,
{
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;

    let http = http_client(config.pos.timeout_secs).map_err(|error| ("http_client", error.to_string(), 3u8))?;
    let backend = Arc::new(OlseraClient::new(http, &config.pos));
    let (sink, writer) = JournalAuditSink::spawn(Arc::new(SqlOrderJournalRepository::new(pool.clone())));
    let admin = OrderAdmin::new(
        backend,
        Arc::new(sink),
        Duration::from_millis(config.engine.request_delay_ms),
    );

    let report = operation(admin).await;
    let _ = writer.await;
    pool.close().await;
    report
}

fn finish(command: &str, result: Result<Result<CancelReport, Failure>, CommandResult>) -> CommandResult {
    match result {
        Ok(Ok(report)) if report.is_clean() => CommandResult::success(command, report.message()),
        Ok(Ok(report)) => CommandResult::failure(command, "cancel_incomplete", report.message(), 1),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
        Err(failure) => failure,
    }
}
