//! Entitlement Store — per-user plan tier, admin override, and credit balance.
//!
//! All writes go through the `user_tokens` stored procedures, each a single
//! upsert statement. No locking happens here; the database serializes calls
//! and the last write wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::entitlement::EntitlementRow;

pub mod credits;
pub mod events;
pub mod handlers;
pub mod realtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Basic,
    Premium,
}

impl Plan {
    pub fn from_indicator(indicator: i32) -> Self {
        if indicator == 1 {
            Plan::Premium
        } else {
            Plan::Basic
        }
    }

    pub fn indicator(self) -> i32 {
        match self {
            Plan::Basic => 0,
            Plan::Premium => 1,
        }
    }
}

/// The override wins over everything; otherwise the plan indicator decides.
pub fn effective_plan(record: &EntitlementRow) -> Plan {
    if record.custom_premium == 1 {
        return Plan::Premium;
    }
    Plan::from_indicator(record.plan_indicator)
}

/// Storage seam for entitlements. `PgEntitlementStore` in production,
/// in-memory fakes in tests.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Returns the user's record, or a basic default if none exists yet.
    async fn get(&self, user_id: Uuid) -> Result<EntitlementRow, AppError>;

    /// Writes the plan indicator and returns the stored value. Idempotent.
    async fn set_plan(&self, user_id: Uuid, plan: Plan) -> Result<i32, AppError>;

    /// Flips `custom_premium` and returns its new value.
    async fn toggle_custom_premium(&self, user_id: Uuid) -> Result<i32, AppError>;

    /// Subtracts credits and returns the new balance. A negative amount refunds.
    async fn deduct_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError>;

    async fn add_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError>;

    async fn effective_plan(&self, user_id: Uuid) -> Result<Plan, AppError> {
        Ok(effective_plan(&self.get(user_id).await?))
    }
}

#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn get(&self, user_id: Uuid) -> Result<EntitlementRow, AppError> {
        let row = sqlx::query_as::<_, EntitlementRow>("SELECT * FROM user_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.unwrap_or_else(|| EntitlementRow::basic_default(user_id)))
    }

    async fn set_plan(&self, user_id: Uuid, plan: Plan) -> Result<i32, AppError> {
        let sql = match plan {
            Plan::Premium => "SELECT make_user_premium($1)",
            Plan::Basic => "SELECT make_user_basic($1)",
        };
        let indicator: i32 = sqlx::query_scalar(sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        tracing::debug!("Set plan indicator {indicator} for user {user_id}");
        Ok(indicator)
    }

    async fn toggle_custom_premium(&self, user_id: Uuid) -> Result<i32, AppError> {
        let value: i32 = sqlx::query_scalar("SELECT toggle_user_premium($1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!("Custom premium override for user {user_id} is now {value}");
        Ok(value)
    }

    async fn deduct_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        Ok(sqlx::query_scalar("SELECT deduct_user_tokens($1, $2)")
            .bind(user_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn add_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        Ok(sqlx::query_scalar("SELECT add_user_tokens($1, $2)")
            .bind(user_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryEntitlementStore;

    fn record(plan_indicator: i32, custom_premium: i32) -> EntitlementRow {
        EntitlementRow {
            plan_indicator,
            custom_premium,
            ..EntitlementRow::basic_default(Uuid::new_v4())
        }
    }

    #[test]
    fn test_plan_indicator_mapping() {
        assert_eq!(Plan::from_indicator(1), Plan::Premium);
        assert_eq!(Plan::from_indicator(0), Plan::Basic);
        assert_eq!(Plan::Premium.indicator(), 1);
        assert_eq!(Plan::Basic.indicator(), 0);
    }

    #[test]
    fn test_effective_plan_follows_indicator_without_override() {
        assert_eq!(effective_plan(&record(0, 0)), Plan::Basic);
        assert_eq!(effective_plan(&record(1, 0)), Plan::Premium);
    }

    #[test]
    fn test_custom_premium_wins_over_basic_indicator() {
        assert_eq!(effective_plan(&record(0, 1)), Plan::Premium);
        assert_eq!(effective_plan(&record(1, 1)), Plan::Premium);
    }

    #[tokio::test]
    async fn test_missing_record_defaults_to_basic() {
        let store = MemoryEntitlementStore::default();
        let plan = store.effective_plan(Uuid::new_v4()).await.unwrap();
        assert_eq!(plan, Plan::Basic);
    }

    #[tokio::test]
    async fn test_set_plan_is_idempotent() {
        let store = MemoryEntitlementStore::default();
        let user = Uuid::new_v4();
        assert_eq!(store.set_plan(user, Plan::Premium).await.unwrap(), 1);
        assert_eq!(store.set_plan(user, Plan::Premium).await.unwrap(), 1);
        assert_eq!(store.effective_plan(user).await.unwrap(), Plan::Premium);
    }

    #[tokio::test]
    async fn test_credits_do_not_touch_plan_indicator() {
        let store = MemoryEntitlementStore::default();
        let user = Uuid::new_v4();
        store.add_credits(user, 3).await.unwrap();
        assert_eq!(store.deduct_credits(user, 1).await.unwrap(), 2);
        let row = store.get(user).await.unwrap();
        assert_eq!(row.plan_indicator, 0);
        assert_eq!(row.token_balance, 2);
    }
}
