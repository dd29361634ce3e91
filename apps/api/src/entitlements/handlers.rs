use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entitlements::credits::OperationResult;
use crate::entitlements::events::TokenUpdate;
use crate::entitlements::{effective_plan, Plan};
use crate::errors::AppError;
use crate::state::AppState;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub user_id: Uuid,
    pub plan: Plan,
    pub custom_premium: bool,
    pub token_balance: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub user_id: Uuid,
    pub custom_premium: bool,
    pub plan: Plan,
}

/// GET /api/v1/entitlements/:user_id
pub async fn handle_get_entitlement(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<EntitlementResponse>, AppError> {
    let row = state.entitlements.get(user_id).await?;
    Ok(Json(EntitlementResponse {
        user_id,
        plan: effective_plan(&row),
        custom_premium: row.custom_premium == 1,
        token_balance: row.token_balance,
    }))
}

/// POST /api/v1/entitlements/:user_id/custom-premium/toggle
///
/// Debug/admin only. Requires `x-admin-key` to match `ADMIN_API_KEY`.
pub async fn handle_toggle_custom_premium(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ToggleResponse>, AppError> {
    require_admin(&headers, state.config.admin_api_key.as_deref())?;

    let value = state.entitlements.toggle_custom_premium(user_id).await?;
    let plan = state.entitlements.effective_plan(user_id).await?;
    Ok(Json(ToggleResponse {
        user_id,
        custom_premium: value == 1,
        plan,
    }))
}

/// POST /api/v1/entitlements/:user_id/credits/deduct
pub async fn handle_deduct_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<CreditRequest>,
) -> Json<OperationResult> {
    Json(OperationResult::from_balance(
        state.entitlements.deduct_credits(user_id, req.amount).await,
    ))
}

/// POST /api/v1/entitlements/:user_id/credits/add
pub async fn handle_add_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<CreditRequest>,
) -> Json<OperationResult> {
    Json(OperationResult::from_balance(
        state.entitlements.add_credits(user_id, req.amount).await,
    ))
}

/// GET /api/v1/entitlements/:user_id/stream
///
/// Server-sent events: the current entitlement first, then every published
/// change for this user. The bus subscription lives as long as the stream.
pub async fn handle_entitlement_stream(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let initial = TokenUpdate::from(&state.entitlements.get(user_id).await?);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<TokenUpdate>();
    let subscription = state.events.subscribe(move |update| {
        if update.user_id == user_id {
            let _ = tx.send(update.clone());
        }
    });

    let updates = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let update = rx.recv().await?;
        Some((update, (rx, subscription)))
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|update| Ok(to_event(&update)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_event(update: &TokenUpdate) -> Event {
    Event::default()
        .event("entitlement")
        .data(serde_json::to_string(update).unwrap_or_default())
}

fn require_admin(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let expected = expected.ok_or(AppError::Forbidden)?;
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if provided != expected {
        return Err(AppError::Forbidden);
    }
    Ok(())
}
