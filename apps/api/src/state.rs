use std::sync::Arc;

use sqlx::PgPool;

use crate::billing::BillingProvider;
use crate::config::Config;
use crate::entitlements::events::TokenEvents;
use crate::entitlements::EntitlementStore;
use crate::interview::iterations::IterationStore;
use crate::llm_client::LlmClient;
use crate::subscription::cache::SubscriptionCache;
use crate::subscription::reconcile::Reconciler;
use crate::usage::UsageStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    pub config: Config,
    /// Plan, override and credit balance per user. Postgres-backed in production.
    pub entitlements: Arc<dyn EntitlementStore>,
    pub subscriptions: Arc<dyn SubscriptionCache>,
    pub usage: Arc<dyn UsageStore>,
    /// Append-only answer drafts and their feedback.
    pub iterations: Arc<dyn IterationStore>,
    /// Stripe by default.
    pub billing: Arc<dyn BillingProvider>,
    /// Owns the per-user debounce map, so there must be exactly one.
    pub reconciler: Arc<Reconciler>,
    /// Fed by the `user_tokens_changed` listener; drained by SSE streams.
    pub events: TokenEvents,
}
