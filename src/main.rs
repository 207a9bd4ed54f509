mod auth;
mod awards;
mod config;
mod entities;
mod http;
mod hubspot;
mod models;
mod settings;
mod state;
mod sync;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AdminAuthenticator;
use crate::config::{ApiConfig, LogFormat};
use crate::hubspot::HubSpotClient;
use crate::state::{ApiCache, AppState};
use crate::sync::CrmSync;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::Request;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ApiConfig::load().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let auth = AdminAuthenticator::new(&config.admin).context("Failed to initialize admin auth")?;
    let hubspot = HubSpotClient::from_config(&config.hubspot)
        .context("Failed to initialize HubSpot client")?;
    if hubspot.is_none() {
        warn!("HUBSPOT_TOKEN not set; CRM sync is disabled");
    }

    let crm_sync = Arc::new(CrmSync::new(
        database.clone(),
        hubspot,
        config.hubspot.batch_size,
    ));
    let cache = Arc::new(ApiCache::new(&config.cache));
    let app_state = AppState::new(
        database.clone(),
        cache,
        Arc::new(auth),
        Arc::clone(&crm_sync),
        config.defaults.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = match config.hubspot.sync_interval() {
        Some(interval) if crm_sync.is_configured() => {
            let crm_sync = Arc::clone(&crm_sync);
            Some(tokio::spawn(async move {
                if let Err(err) = crm_sync.run(interval, shutdown_rx).await {
                    error!("HubSpot sync loop terminated with error: {err}");
                }
            }))
        }
        _ => None,
    };

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("World Staffing Awards API listening on {local_addr}");

    let router: Router = http::router(app_state, &config.server.cors_origins);
    let app = NormalizePathLayer::trim_trailing_slash().layer(router);
    let server = axum::serve(
        listener,
        axum::ServiceExt::<Request>::into_make_service(app),
    );
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Some(handle) = sync_handle {
        if let Err(join_err) = handle.await {
            error!("HubSpot sync task join error: {join_err}");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
