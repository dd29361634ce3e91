//! Usage Gate — monthly usage counters against plan-dependent limits.
//!
//! The gate is advisory. `blocked` drives the client's "wait or upgrade"
//! prompt; nothing here refuses to record usage or run the underlying action.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entitlements::{EntitlementStore, Plan};
use crate::errors::AppError;
use crate::models::usage::UsageEventRow;

pub mod handlers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    Behavioral,
    QuestionVault,
}

impl UsageType {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageType::Behavioral => "behavioral",
            UsageType::QuestionVault => "question_vault",
        }
    }
}

/// Monthly allowance. `None` means unlimited.
pub fn limit_for(plan: Plan, usage_type: UsageType) -> Option<u32> {
    match (plan, usage_type) {
        (Plan::Premium, _) => None,
        (Plan::Basic, UsageType::Behavioral) => Some(5),
        (Plan::Basic, UsageType::QuestionVault) => Some(10),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    WaitUntilNextCycle,
    Upgrade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageGate {
    pub usage_type: UsageType,
    pub count: u32,
    pub limit: Option<u32>,
    pub blocked: bool,
    /// Start of the next calendar month (UTC), when the count returns to zero.
    pub resets_at: DateTime<Utc>,
    /// Options to offer when `blocked`; empty otherwise.
    pub actions: Vec<GateAction>,
}

/// Bounds of the calendar month containing `now`: `[start, next_start)`.
pub fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = first_of_month(now.year(), now.month());
    let next = if now.month() == 12 {
        first_of_month(now.year() + 1, 1)
    } else {
        first_of_month(now.year(), now.month() + 1)
    };
    (start, next)
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn evaluate(
    usage_type: UsageType,
    plan: Plan,
    count: u32,
    now: DateTime<Utc>,
) -> UsageGate {
    let limit = limit_for(plan, usage_type);
    let blocked = limit.map_or(false, |l| count >= l);
    let actions = if blocked {
        let mut actions = vec![GateAction::WaitUntilNextCycle];
        if plan == Plan::Basic {
            actions.push(GateAction::Upgrade);
        }
        actions
    } else {
        Vec::new()
    };

    UsageGate {
        usage_type,
        count,
        limit,
        blocked,
        resets_at: month_window(now).1,
        actions,
    }
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn count_between(
        &self,
        user_id: Uuid,
        usage_type: UsageType,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, AppError>;

    /// Appends a usage event. Never consults the gate.
    async fn record(&self, user_id: Uuid, usage_type: UsageType) -> Result<UsageEventRow, AppError>;
}

#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn count_between(
        &self,
        user_id: Uuid,
        usage_type: UsageType,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM usage_events
            WHERE user_id = $1 AND usage_type = $2 AND created_at >= $3 AND created_at < $4
            "#,
        )
        .bind(user_id)
        .bind(usage_type.as_str())
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn record(&self, user_id: Uuid, usage_type: UsageType) -> Result<UsageEventRow, AppError> {
        Ok(sqlx::query_as::<_, UsageEventRow>(
            "INSERT INTO usage_events (user_id, usage_type) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(usage_type.as_str())
        .fetch_one(&self.pool)
        .await?)
    }
}

/// Current month's count for `usage_type` compared against the user's limit.
pub async fn check_usage(
    usage: &dyn UsageStore,
    entitlements: &dyn EntitlementStore,
    user_id: Uuid,
    usage_type: UsageType,
) -> Result<UsageGate, AppError> {
    let now = Utc::now();
    let (from, until) = month_window(now);
    let count = usage.count_between(user_id, usage_type, from, until).await?;
    let plan = entitlements.effective_plan(user_id).await?;
    Ok(evaluate(usage_type, plan, count, now))
}
