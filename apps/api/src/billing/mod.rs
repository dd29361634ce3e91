//! Billing provider seam. Reconciliation and the checkout/portal endpoints talk
//! to `dyn BillingProvider`; `StripeClient` is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod handlers;
pub mod stripe;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Billing provider returned no redirect URL")]
    MissingUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

/// Subscription as reported by the provider. Period bounds are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSubscription {
    pub id: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl BillingSubscription {
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start.and_then(from_unix)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.and_then(from_unix)
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, BillingError>;

    async fn list_active_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<BillingSubscription>, BillingError>;

    /// Returns the hosted checkout URL.
    async fn create_checkout_session(
        &self,
        customer_email: &str,
        user_id: Uuid,
    ) -> Result<String, BillingError>;

    /// Returns the customer portal URL.
    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError>;
}
