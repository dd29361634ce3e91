pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::billing::handlers as billing;
use crate::entitlements::handlers as entitlements;
use crate::interview::handlers as interview;
use crate::state::AppState;
use crate::subscription::handlers as subscription;
use crate::usage::handlers as usage;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Entitlements
        .route(
            "/api/v1/entitlements/:user_id",
            get(entitlements::handle_get_entitlement),
        )
        .route(
            "/api/v1/entitlements/:user_id/stream",
            get(entitlements::handle_entitlement_stream),
        )
        .route(
            "/api/v1/entitlements/:user_id/custom-premium/toggle",
            post(entitlements::handle_toggle_custom_premium),
        )
        .route(
            "/api/v1/entitlements/:user_id/credits/deduct",
            post(entitlements::handle_deduct_credits),
        )
        .route(
            "/api/v1/entitlements/:user_id/credits/add",
            post(entitlements::handle_add_credits),
        )
        // Subscription reconciliation
        .route("/api/v1/subscription/sync", post(subscription::handle_sync))
        .route(
            "/api/v1/subscription/:user_id",
            get(subscription::handle_get_subscription),
        )
        // Billing
        .route("/api/v1/billing/checkout", post(billing::handle_checkout))
        .route("/api/v1/billing/portal", post(billing::handle_portal))
        // Usage
        .route(
            "/api/v1/usage/:user_id/:usage_type",
            get(usage::handle_check_usage).post(usage::handle_record_usage),
        )
        // Interview
        .route(
            "/api/v1/interviews/questions",
            post(interview::handle_generate_questions),
        )
        .route("/api/v1/answers", post(interview::handle_submit_answer))
        .route(
            "/api/v1/answers/validate",
            post(interview::handle_validate_answer),
        )
        .route(
            "/api/v1/answers/:id/feedback",
            post(interview::handle_generate_feedback),
        )
        .route(
            "/api/v1/applications/:job_application_id/answers/:question_index",
            get(interview::handle_list_iterations),
        )
        .with_state(state)
}
