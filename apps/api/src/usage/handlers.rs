use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::usage::UsageEventRow;
use crate::state::AppState;
use crate::usage::{check_usage, UsageGate, UsageType};

#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    pub event: UsageEventRow,
    pub gate: UsageGate,
}

/// GET /api/v1/usage/:user_id/:usage_type
pub async fn handle_check_usage(
    State(state): State<AppState>,
    Path((user_id, usage_type)): Path<(Uuid, UsageType)>,
) -> Result<Json<UsageGate>, AppError> {
    let gate = check_usage(
        state.usage.as_ref(),
        state.entitlements.as_ref(),
        user_id,
        usage_type,
    )
    .await?;
    Ok(Json(gate))
}

/// POST /api/v1/usage/:user_id/:usage_type
///
/// Records regardless of the gate and returns the updated gate state.
pub async fn handle_record_usage(
    State(state): State<AppState>,
    Path((user_id, usage_type)): Path<(Uuid, UsageType)>,
) -> Result<Json<RecordUsageResponse>, AppError> {
    let event = state.usage.record(user_id, usage_type).await?;
    let gate = check_usage(
        state.usage.as_ref(),
        state.entitlements.as_ref(),
        user_id,
        usage_type,
    )
    .await?;
    Ok(Json(RecordUsageResponse { event, gate }))
}
