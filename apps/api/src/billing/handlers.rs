use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::find_user;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BillingRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub url: String,
}

/// POST /api/v1/billing/checkout
pub async fn handle_checkout(
    State(state): State<AppState>,
    Json(req): Json<BillingRequest>,
) -> Result<Json<RedirectResponse>, AppError> {
    let user = find_user(&state.db, req.user_id).await?;
    let url = state
        .billing
        .create_checkout_session(&user.email, user.id)
        .await?;
    info!("Created checkout session for user {}", user.id);
    Ok(Json(RedirectResponse { url }))
}

/// POST /api/v1/billing/portal
pub async fn handle_portal(
    State(state): State<AppState>,
    Json(req): Json<BillingRequest>,
) -> Result<Json<RedirectResponse>, AppError> {
    let user = find_user(&state.db, req.user_id).await?;
    let customer = state
        .billing
        .find_customer_by_email(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No billing customer for user {}", user.id)))?;
    let url = state.billing.create_portal_session(&customer.id).await?;
    Ok(Json(RedirectResponse { url }))
}
