mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use cambio_sdk::{CambioClient, OperationKind, SessionStore};
use clap::Parser;
use cli::{Cli, Commands};
use commands::App;
use config::Config;
use std::io::Write;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load apps/cli/config.toml")?;
    if let Some(url) = &cli.api_url {
        config.api.url = url.clone();
    }
    let session_path = cli.session.clone().unwrap_or_else(|| config.session_path());

    info!("📡 API URL: {}", config.api.url);
    debug!("Session file: {}", session_path.display());

    let client = CambioClient::new(config.client_config(), SessionStore::from_file(&session_path))
        .context("Failed to create API client")?;

    // A rejected credential sends the user back to the start: log in again
    client.on_auth_rejected(|rejection| {
        eprintln!(
            "Session expired or invalid ({}). Run `cambio login` to sign in again.",
            rejection
        );
    });

    let app = App::new(client);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Register {
            email,
            name,
            password,
        } => app.register(&mut out, email, password, name).await?,
        Commands::Login { email, password } => app.login(&mut out, email, password).await?,
        Commands::Logout => app.logout(&mut out).await?,
        Commands::Whoami { remote } => app.whoami(&mut out, *remote).await?,
        Commands::Status => app.status(&mut out).await?,
        Commands::Rates { watch: false } => app.rates(&mut out).await?,
        Commands::Rates { watch: true } => app.watch_rates(&mut out).await?,
        Commands::Buy(args) => app.operate(&mut out, OperationKind::Buy, args).await?,
        Commands::Sell(args) => app.operate(&mut out, OperationKind::Sell, args).await?,
        Commands::Extract(args) => app.extract(&mut out, args).await?,
    }

    out.flush()?;
    Ok(())
}
