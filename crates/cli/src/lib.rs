pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kasir",
    about = "Kasir operator CLI",
    long_about = "Inspect configuration, prepare the order journal, refresh POS credentials and the catalog snapshot, and void orders.",
    after_help = "Examples:\n  kasir doctor --json\n  kasir token-refresh\n  kasir catalog-sync\n  kasir cancel SO-0412 SO-0413"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending order-journal migrations")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Check configuration, journal database, POS token cache and catalog snapshot")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Void orders by order number (open orders first, then closed)")]
    Cancel {
        #[arg(required = true, value_name = "ORDER_NO")]
        order_numbers: Vec<String>,
    },
    #[command(about = "Void every order opened yesterday or today")]
    ClearOpen,
    #[command(about = "Page through the POS catalog and write the snapshot file")]
    CatalogSync,
    #[command(about = "Exchange the POS app credentials for a fresh bearer token")]
    TokenRefresh,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Cancel { order_numbers } => commands::cancel::run(&order_numbers),
        Command::ClearOpen => commands::cancel::run_clear_open(),
        Command::CatalogSync => commands::catalog_sync::run(),
        Command::TokenRefresh => commands::token_refresh::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
