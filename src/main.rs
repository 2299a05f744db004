// src/main.rs

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use campus_market::{
    config::Config,
    routes,
    state::AppState,
    store::spawn_two_factor_reaper,
    utils::email::{EmailClient, HttpEmailClient, LogEmailClient},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let mailer: Arc<dyn EmailClient> = match &config.mail {
        Some(mail) => {
            tracing::info!(api = %mail.api_url, "Using HTTP mail transport");
            Arc::new(HttpEmailClient::new(mail).context("Failed to build mail client")?)
        }
        None => {
            tracing::warn!("MAIL_API_URL not set, emails will only be logged");
            Arc::new(LogEmailClient)
        }
    };

    let state = match &config.database_url {
        Some(url) => {
            let pool = connect_with_retry(url).await?;
            tracing::info!("Database connected...");

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Migrations applied successfully.");

            AppState::postgres(pool, config.clone(), mailer)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on in-memory stores");
            AppState::in_memory(config.clone(), mailer)
        }
    };

    spawn_two_factor_reaper(state.two_factor.clone(), Duration::from_secs(60));

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.app_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.app_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    // Start the server
    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize Database Pool with Retry
async fn connect_with_retry(url: &str) -> anyhow::Result<PgPool> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    return Err(e).context("Failed to connect to database after 5 retries");
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
