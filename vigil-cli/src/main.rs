mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // CLI tracing policy:
    //   --quiet  → "off"
    //   --verbose → RUST_LOG if set, otherwise "debug" for vigil crates
    //   default  → RUST_LOG if set, otherwise "info" (migrations are long;
    //              progress logs are the primary operator feedback)
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vigil_store=debug,vigil_migration=debug,info".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    let config_path = config::resolve_config_path(cli.config.as_deref());
    let migration_config = config::load_config(&config_path)?;

    match cli.command {
        Commands::Migrate {
            id,
            prefix,
            stores,
            confirm,
            restart,
        } => commands::migrate::run(migration_config, &id, &prefix, stores, confirm, restart).await,
        Commands::Status { id } => commands::status::run(migration_config, &id).await,
    }
}
