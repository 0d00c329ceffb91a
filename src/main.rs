//! Student intake bot
//!
//! A Telegram bot that walks a student through a short form (name, age,
//! grade), asks for confirmation and keeps one record per user in SQLite.

mod config;
mod db;
mod messages;
mod runtime;
mod state_machine;
mod telegram;

use config::BotConfig;
use db::Database;
use runtime::{DatabaseStore, ProductionRuntime, TelegramTransport};
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "student_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let client = TelegramClient::new(&config.api_url, &config.token, config.poll_timeout)?;

    // Fails fast on a bad token
    let me = client.get_me().await?;
    tracing::info!(bot_id = me.id, username = ?me.username, "Authenticated with Bot API");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let runtime = ProductionRuntime::new(
        DatabaseStore::new(db),
        TelegramTransport::new(client, me.username),
        shutdown,
    );

    tracing::info!(
        api_url = %config.api_url,
        poll_timeout_secs = config.poll_timeout.as_secs(),
        "Student bot polling for updates"
    );
    runtime.run().await;

    Ok(())
}
