//! Subscription reconciliation.
//!
//! Order of checks for every trigger:
//! 1. Debounce: if a full sync for this user started less than
//!    `settings.debounce` ago, do nothing remote.
//! 2. Non-critical triggers consult the local cache and skip the remote call
//!    when the cached row is present and does not `needs_sync`.
//! 3. Full sync: the `custom_premium` override short-circuits before any
//!    billing call; otherwise customer lookup, active subscription lookup,
//!    entitlement write, cache upsert.
//!
//! Concurrent syncs for the same user are only deduplicated by the debounce
//! stamp. Two calls outside the window can race; the store's last-write-wins
//! upsert is the only backstop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::billing::{BillingProvider, BillingSubscription, Customer};
use crate::config::SyncSettings;
use crate::entitlements::{EntitlementStore, Plan};
use crate::errors::AppError;
use crate::models::subscription::SubscriptionRow;
use crate::models::user::User;
use crate::subscription::cache::{needs_sync, SubscriptionCache};
use crate::subscription::SyncTrigger;

/// Status cached when the customer exists but has no active subscription.
const CANCELED_STATUS: &str = "canceled";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// `custom_premium` is set; billing was not consulted.
    Overridden,
    /// A full sync ran within the debounce window.
    Debounced { plan: Plan },
    /// Non-critical trigger and the cached row was trusted.
    CacheFresh { plan: Plan },
    /// Full sync against the billing provider completed.
    Synced {
        plan: Plan,
        subscription_status: Option<String>,
    },
}

impl SyncOutcome {
    pub fn plan(&self) -> Plan {
        match self {
            SyncOutcome::Overridden => Plan::Premium,
            SyncOutcome::Debounced { plan }
            | SyncOutcome::CacheFresh { plan }
            | SyncOutcome::Synced { plan, .. } => *plan,
        }
    }
}

pub struct Reconciler {
    entitlements: Arc<dyn EntitlementStore>,
    cache: Arc<dyn SubscriptionCache>,
    billing: Arc<dyn BillingProvider>,
    settings: SyncSettings,
    last_full_sync: Mutex<HashMap<Uuid, Instant>>,
}

impl Reconciler {
    pub fn new(
        entitlements: Arc<dyn EntitlementStore>,
        cache: Arc<dyn SubscriptionCache>,
        billing: Arc<dyn BillingProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            entitlements,
            cache,
            billing,
            settings,
            last_full_sync: Mutex::new(HashMap::new()),
        }
    }

    pub async fn sync(&self, user: &User, trigger: SyncTrigger) -> Result<SyncOutcome, AppError> {
        if self.within_debounce(user.id) {
            debug!("Sync for user {} debounced ({trigger:?})", user.id);
            let plan = self.entitlements.effective_plan(user.id).await?;
            return Ok(SyncOutcome::Debounced { plan });
        }

        if !trigger.is_critical() {
            if let Some(row) = self.cache.get(user.id).await? {
                if !needs_sync(&row, Utc::now(), self.settings.cache_ttl) {
                    let plan = self.entitlements.effective_plan(user.id).await?;
                    debug!("Cache fresh for user {}, skipping remote sync", user.id);
                    return Ok(SyncOutcome::CacheFresh { plan });
                }
            }
        }

        if !self.stamp_full_sync(user.id) {
            let plan = self.entitlements.effective_plan(user.id).await?;
            return Ok(SyncOutcome::Debounced { plan });
        }

        let outcome = self.full_sync(user).await?;
        info!(
            "Subscription sync for user {} ({trigger:?}) -> {:?}",
            user.id,
            outcome.plan()
        );
        Ok(outcome)
    }

    /// Reads the billing provider and writes entitlement and cache.
    /// Bypasses debounce and cache; callers go through `sync`.
    async fn full_sync(&self, user: &User) -> Result<SyncOutcome, AppError> {
        let record = self.entitlements.get(user.id).await?;
        if record.custom_premium == 1 {
            return Ok(SyncOutcome::Overridden);
        }

        let customer = match self.billing.find_customer_by_email(&user.email).await? {
            Some(c) => c,
            None => {
                debug!("No billing customer for user {}", user.id);
                return self.downgrade(user.id).await;
            }
        };

        let subscription = self
            .billing
            .list_active_subscriptions(&customer.id, 1)
            .await?
            .into_iter()
            .next();

        match subscription {
            Some(sub) => {
                self.entitlements.set_plan(user.id, Plan::Premium).await?;
                let row = cache_row(user.id, &customer, &sub);
                self.cache.upsert(&row).await?;
                Ok(SyncOutcome::Synced {
                    plan: Plan::Premium,
                    subscription_status: Some(sub.status),
                })
            }
            None => {
                self.entitlements.set_plan(user.id, Plan::Basic).await?;
                let row = self.canceled_row(user.id, &customer).await?;
                self.cache.upsert(&row).await?;
                Ok(SyncOutcome::Synced {
                    plan: Plan::Basic,
                    subscription_status: Some(row.subscription_status),
                })
            }
        }
    }

    /// Cache row for a customer with no active subscription. Keeps the last
    /// known subscription id, if any.
    async fn canceled_row(
        &self,
        user_id: Uuid,
        customer: &Customer,
    ) -> Result<SubscriptionRow, AppError> {
        let previous = self.cache.get(user_id).await?;
        Ok(SubscriptionRow {
            user_id,
            stripe_customer_id: customer.id.clone(),
            stripe_subscription_id: previous
                .map(|row| row.stripe_subscription_id)
                .unwrap_or_default(),
            subscription_status: CANCELED_STATUS.to_string(),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            updated_at: Utc::now(),
        })
    }

    async fn downgrade(&self, user_id: Uuid) -> Result<SyncOutcome, AppError> {
        self.entitlements.set_plan(user_id, Plan::Basic).await?;
        Ok(SyncOutcome::Synced {
            plan: Plan::Basic,
            subscription_status: None,
        })
    }

    fn within_debounce(&self, user_id: Uuid) -> bool {
        let map = self
            .last_full_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(&user_id)
            .map_or(false, |at| at.elapsed() < self.settings.debounce)
    }

    /// Records the start of a full sync. Returns false if another sync got
    /// there first inside the window.
    fn stamp_full_sync(&self, user_id: Uuid) -> bool {
        let mut map = self
            .last_full_sync
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        if let Some(at) = map.get(&user_id) {
            if now.duration_since(*at) < self.settings.debounce {
                return false;
            }
        }
        map.insert(user_id, now);
        true
    }
}

fn cache_row(user_id: Uuid, customer: &Customer, sub: &BillingSubscription) -> SubscriptionRow {
    SubscriptionRow {
        user_id,
        stripe_customer_id: customer.id.clone(),
        stripe_subscription_id: sub.id.clone(),
        subscription_status: sub.status.clone(),
        current_period_start: sub.period_start(),
        current_period_end: sub.period_end(),
        cancel_at_period_end: sub.cancel_at_period_end,
        updated_at: Utc::now(),
    }
}
