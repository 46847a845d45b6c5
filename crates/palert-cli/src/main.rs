use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use palert_adapters::AdapterRegistry;
use palert_core::config::AppConfig;
use palert_engine::{RuleProcessor, Scheduler};
use palert_notify::EmailNotifier;
use palert_playtomic::PlaytomicClient;
use palert_store::SqliteStore;
use palert_web::AppState;

#[derive(Debug, Parser)]
#[command(name = "palert")]
#[command(about = "Padel activity alert service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the API server and the rule scheduler (default).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
    }
}

async fn serve() -> Result<()> {
    let config = AppConfig::from_env();
    info!(version = env!("CARGO_PKG_VERSION"), "starting palert service");

    let store = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .with_context(|| format!("opening database {}", config.database_url))?,
    );

    let catalog = Arc::new(PlaytomicClient::new().context("building catalog client")?);
    let registry = Arc::new(AdapterRegistry::new(catalog, store.clone()));
    let notifier = Arc::new(EmailNotifier::from_config(&config.smtp).context("configuring SMTP")?);
    if !notifier.is_enabled() {
        info!("SMTP not configured; email notifications disabled");
    }

    let processor = Arc::new(RuleProcessor::new(
        store.clone(),
        store.clone(),
        registry,
        notifier,
    ));
    let scheduler = Scheduler::new(config.check_interval, store.clone(), processor);
    scheduler
        .start()
        .context("starting scheduler")?;

    let state = AppState {
        api_keys: config.api_keys.clone(),
        rules: store.clone(),
        users: store,
    };
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };

    palert_web::serve(state, config.port, shutdown)
        .await
        .context("running api server")?;

    // The server has drained; wait for in-flight rule evaluations too.
    scheduler.stop().await;
    info!("service stopped");
    Ok(())
}
