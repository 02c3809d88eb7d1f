//! Habana Commerce - storefront API server

use std::sync::Arc;
use anyhow::Result;
use habana_commerce::config::Config;
use habana_commerce::http::{auth::AuthKeys, router, AppState};
use habana_commerce::jobs::spawn_low_stock_scan;
use habana_commerce::notify::{LogNotifier, NatsNotifier, Notifier};
use habana_commerce::services::Services;
use habana_commerce::store::{memory::MemoryStore, postgres::PgStore, Store};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_store(config: &Config) -> Result<Arc<dyn Store>> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    Ok(Arc::new(PgStore::new(db)))
}

async fn connect_notifier(config: &Config) -> Arc<dyn Notifier> {
    let Some(url) = &config.nats_url else { return Arc::new(LogNotifier) };
    match async_nats::connect(url.as_str()).await {
        Ok(client) => {
            tracing::info!(%url, "connected to NATS");
            Arc::new(NatsNotifier::new(client, config.nats_subject_prefix.clone()))
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "NATS unavailable, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let store = connect_store(&config).await?;
    let notifier = connect_notifier(&config).await;

    spawn_low_stock_scan(
        store.clone(),
        notifier.clone(),
        config.low_stock_threshold,
        config.admin_email.clone(),
        config.low_stock_scan_interval,
    );

    let state = AppState {
        services: Services::new(store, notifier, &config),
        auth: Arc::new(AuthKeys::from_secret(&config.jwt_secret)),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Habana Commerce listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, router(state)).await?;
    Ok(())
}
