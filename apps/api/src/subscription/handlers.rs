use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::entitlements::Plan;
use crate::errors::AppError;
use crate::models::subscription::SubscriptionRow;
use crate::models::user::find_user;
use crate::state::AppState;
use crate::subscription::reconcile::SyncOutcome;
use crate::subscription::SyncTrigger;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub user_id: Uuid,
    pub trigger: SyncTrigger,
}

/// `{success, error?}` result of a sync request.
#[derive(Debug, Serialize, PartialEq)]
pub struct SyncReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    fn ok(outcome: SyncOutcome) -> Self {
        Self {
            success: true,
            plan: Some(outcome.plan()),
            outcome: Some(outcome),
            error: None,
        }
    }

    fn failed(error: &AppError) -> Self {
        Self {
            success: false,
            plan: None,
            outcome: None,
            error: Some(error.to_string()),
        }
    }
}

/// Background failures become a quiet `success: false`; only `Manual`
/// failures are returned as errors.
fn report(trigger: SyncTrigger, result: Result<SyncOutcome, AppError>) -> Result<SyncReport, AppError> {
    match result {
        Ok(outcome) => Ok(SyncReport::ok(outcome)),
        Err(e) if trigger.is_user_initiated() => Err(e),
        Err(e) => {
            warn!("Background subscription sync ({trigger:?}) failed: {e}");
            Ok(SyncReport::failed(&e))
        }
    }
}

/// POST /api/v1/subscription/sync
pub async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncReport>, AppError> {
    let user = find_user(&state.db, req.user_id).await?;
    let result = state.reconciler.sync(&user, req.trigger).await;
    Ok(Json(report(req.trigger, result)?))
}

/// GET /api/v1/subscription/:user_id
pub async fn handle_get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SubscriptionRow>, AppError> {
    state
        .subscriptions
        .get(user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No subscription cached for user {user_id}")))
}
