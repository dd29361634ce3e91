use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::subscription::SubscriptionRow;

pub const ACTIVE_STATUS: &str = "active";

/// Whether a cached row is too old or too doubtful to trust on a
/// non-critical trigger.
///
/// True when the period ended and the subscription was set to cancel at
/// period end, when the row is older than `ttl`, or when the status is not
/// `active`.
pub fn needs_sync(row: &SubscriptionRow, now: DateTime<Utc>, ttl: Duration) -> bool {
    let lapsed_cancellation = row.cancel_at_period_end
        && row.current_period_end.map_or(false, |end| end <= now);
    let stale = now - row.updated_at > ttl;
    let inactive = row.subscription_status != ACTIVE_STATUS;

    lapsed_cancellation || stale || inactive
}

/// Local subscription cache, keyed by user id. Never the entitlement source
/// of truth.
#[async_trait]
pub trait SubscriptionCache: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRow>, AppError>;

    /// Insert-or-replace on `user_id`; the last write wins.
    async fn upsert(&self, row: &SubscriptionRow) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgSubscriptionCache {
    pool: PgPool,
}

impl PgSubscriptionCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionCache for PgSubscriptionCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(
            sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn upsert(&self, row: &SubscriptionRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, stripe_customer_id, stripe_subscription_id, subscription_status,
                 current_period_start, current_period_end, cancel_at_period_end, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id     = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                subscription_status    = EXCLUDED.subscription_status,
                current_period_start   = EXCLUDED.current_period_start,
                current_period_end     = EXCLUDED.current_period_end,
                cancel_at_period_end   = EXCLUDED.cancel_at_period_end,
                updated_at             = EXCLUDED.updated_at
            "#,
        )
        .bind(row.user_id)
        .bind(&row.stripe_customer_id)
        .bind(&row.stripe_subscription_id)
        .bind(&row.subscription_status)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.cancel_at_period_end)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_row(now: DateTime<Utc>) -> SubscriptionRow {
        SubscriptionRow {
            user_id: Uuid::new_v4(),
            stripe_customer_id: "cus_1".into(),
            stripe_subscription_id: "sub_1".into(),
            subscription_status: "active".into(),
            current_period_start: Some(now - Duration::days(10)),
            current_period_end: Some(now + Duration::days(20)),
            cancel_at_period_end: false,
            updated_at: now - Duration::hours(1),
        }
    }

    #[test]
    fn test_fresh_active_row_is_trusted() {
        let now = Utc::now();
        assert!(!needs_sync(&fresh_row(now), now, Duration::hours(24)));
    }

    #[test]
    fn test_stale_row_needs_sync() {
        let now = Utc::now();
        let row = SubscriptionRow {
            updated_at: now - Duration::hours(25),
            ..fresh_row(now)
        };
        assert!(needs_sync(&row, now, Duration::hours(24)));
    }

    #[test]
    fn test_non_active_status_needs_sync() {
        let now = Utc::now();
        let row = SubscriptionRow {
            subscription_status: "past_due".into(),
            ..fresh_row(now)
        };
        assert!(needs_sync(&row, now, Duration::hours(24)));
    }

    #[test]
    fn test_expired_and_cancelling_needs_sync() {
        let now = Utc::now();
        let row = SubscriptionRow {
            current_period_end: Some(now - Duration::minutes(1)),
            cancel_at_period_end: true,
            ..fresh_row(now)
        };
        assert!(needs_sync(&row, now, Duration::hours(24)));
    }

    #[test]
    fn test_expired_without_cancel_flag_is_still_trusted() {
        let now = Utc::now();
        let row = SubscriptionRow {
            current_period_end: Some(now - Duration::minutes(1)),
            ..fresh_row(now)
        };
        assert!(!needs_sync(&row, now, Duration::hours(24)));
    }

    #[test]
    fn test_cancelling_but_not_expired_is_trusted() {
        let now = Utc::now();
        let row = SubscriptionRow {
            cancel_at_period_end: true,
            ..fresh_row(now)
        };
        assert!(!needs_sync(&row, now, Duration::hours(24)));
    }
}
