use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Row of `user_tokens`. Written only through the stored procedures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EntitlementRow {
    pub user_id: Uuid,
    /// 0 = basic, 1 = premium.
    pub plan_indicator: i32,
    /// 1 forces premium regardless of billing state.
    pub custom_premium: i32,
    /// Consumable credits, kept apart from the plan indicator.
    pub token_balance: i32,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementRow {
    /// The record a user has before any procedure has touched their row.
    pub fn basic_default(user_id: Uuid) -> Self {
        Self {
            user_id,
            plan_indicator: 0,
            custom_premium: 0,
            token_balance: 0,
            updated_at: Utc::now(),
        }
    }
}
