mod billing;
mod config;
mod db;
mod entitlements;
mod errors;
mod interview;
mod llm_client;
mod models;
mod routes;
mod state;
mod subscription;
mod usage;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::billing::stripe::StripeClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::entitlements::events::TokenEvents;
use crate::entitlements::realtime::listen_for_token_changes;
use crate::entitlements::{EntitlementStore, PgEntitlementStore};
use crate::interview::iterations::PgIterationStore;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::subscription::cache::PgSubscriptionCache;
use crate::subscription::reconcile::Reconciler;
use crate::subscription::scheduler::spawn_daily_check;
use crate::usage::PgUsageStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storyline API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.openai_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize billing
    let billing = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_price_id.clone(),
        config.app_base_url.clone(),
    )?);
    info!("Stripe client initialized");

    // Stores and reconciliation
    let entitlements: Arc<dyn EntitlementStore> = Arc::new(PgEntitlementStore::new(db.clone()));
    let subscriptions = Arc::new(PgSubscriptionCache::new(db.clone()));
    let reconciler = Arc::new(Reconciler::new(
        entitlements.clone(),
        subscriptions.clone(),
        billing.clone(),
        config.sync,
    ));
    let events = TokenEvents::new();

    // Background tasks
    let listener_task = tokio::spawn(listen_for_token_changes(
        db.clone(),
        entitlements.clone(),
        events.clone(),
    ));
    let daily_task = spawn_daily_check(db.clone(), reconciler.clone(), config.sync.daily_interval);
    info!(
        "Daily subscription check every {}h",
        config.sync.daily_interval.as_secs() / 3600
    );

    let state = AppState {
        db: db.clone(),
        llm,
        config: config.clone(),
        entitlements,
        subscriptions,
        usage: Arc::new(PgUsageStore::new(db.clone())),
        iterations: Arc::new(PgIterationStore::new(db)),
        billing,
        reconciler,
        events,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to APP_BASE_URL

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    listener_task.abort();
    daily_task.abort();
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!("Could not register SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}
