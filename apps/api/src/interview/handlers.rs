//! Axum route handlers for the Interview API.

use std::future::Future;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::entitlements::credits::charge_then;
use crate::entitlements::EntitlementStore;
use crate::errors::AppError;
use crate::interview::feedback::{generate_feedback, Feedback};
use crate::interview::iterations::{
    already_has_feedback, stored_feedback, IterationStore, NewIteration,
};
use crate::interview::questions::{generate_questions, InterviewQuestion};
use crate::interview::validation::{validate, ValidationResult};
use crate::models::answer::AnswerIterationRow;
use crate::state::AppState;
use crate::usage::{check_usage, UsageGate, UsageType};

/// Credits charged for one feedback generation.
const FEEDBACK_COST: i32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub user_id: Uuid,
    pub resume_text: String,
    pub job_description: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateQuestionsResponse {
    pub questions: Vec<InterviewQuestion>,
    pub usage: UsageGate,
}

#[derive(Debug, Deserialize)]
pub struct ValidateAnswerRequest {
    pub answer_text: String,
    pub question_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub user_id: Uuid,
    pub job_application_id: Uuid,
    pub question_index: usize,
    pub answer_text: String,
}

#[derive(Debug, Serialize)]
pub struct IterationView {
    #[serde(flatten)]
    pub row: AnswerIterationRow,
    pub parsed_feedback: Option<Feedback>,
}

impl From<AnswerIterationRow> for IterationView {
    fn from(row: AnswerIterationRow) -> Self {
        Self {
            parsed_feedback: stored_feedback(&row),
            row,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub iteration: IterationView,
    pub validation: ValidationResult,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: Uuid,
    pub question: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interviews/questions
///
/// Records one `behavioral` usage event and returns the gate state alongside
/// the questions. The gate is advisory and never stops generation.
pub async fn handle_generate_questions(
    State(state): State<AppState>,
    Json(request): Json<GenerateQuestionsRequest>,
) -> Result<Json<GenerateQuestionsResponse>, AppError> {
    if request.resume_text.trim().is_empty() {
        return Err(AppError::Validation(
            "A resume is required before questions can be generated".to_string(),
        ));
    }
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "A job description is required before questions can be generated".to_string(),
        ));
    }

    let questions =
        generate_questions(&state.llm, &request.resume_text, &request.job_description).await?;

    state
        .usage
        .record(request.user_id, UsageType::Behavioral)
        .await?;
    let usage = check_usage(
        state.usage.as_ref(),
        state.entitlements.as_ref(),
        request.user_id,
        UsageType::Behavioral,
    )
    .await?;

    info!(
        "Generated {} questions for user {} ({} of {:?} this month)",
        questions.len(),
        request.user_id,
        usage.count,
        usage.limit
    );

    Ok(Json(GenerateQuestionsResponse { questions, usage }))
}

/// POST /api/v1/answers/validate
pub async fn handle_validate_answer(
    Json(request): Json<ValidateAnswerRequest>,
) -> Json<ValidationResult> {
    Json(validate(&request.answer_text, request.question_index))
}

/// POST /api/v1/answers
///
/// Appends a new iteration. Short answers are stored; the validation result
/// is returned for the client to display.
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    if request.answer_text.trim().is_empty() {
        return Err(AppError::Validation("answer_text cannot be empty".to_string()));
    }
    let question_index = i32::try_from(request.question_index)
        .map_err(|_| AppError::Validation("question_index is out of range".to_string()))?;

    let validation = validate(&request.answer_text, request.question_index);
    let row = state
        .iterations
        .append(NewIteration {
            user_id: request.user_id,
            job_application_id: request.job_application_id,
            question_index,
            answer_text: request.answer_text,
        })
        .await?;

    Ok(Json(SubmitAnswerResponse {
        iteration: row.into(),
        validation,
    }))
}

/// GET /api/v1/applications/:job_application_id/answers/:question_index
pub async fn handle_list_iterations(
    State(state): State<AppState>,
    Path((job_application_id, question_index)): Path<(Uuid, i32)>,
) -> Result<Json<Vec<IterationView>>, AppError> {
    let rows = state
        .iterations
        .list(job_application_id, question_index)
        .await?;
    Ok(Json(rows.into_iter().map(IterationView::from).collect()))
}

/// POST /api/v1/answers/:id/feedback
pub async fn handle_generate_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<IterationView>, AppError> {
    let llm = state.llm.clone();
    let question = request.question;
    let row = feedback_for_iteration(
        state.iterations.as_ref(),
        state.entitlements.as_ref(),
        id,
        request.user_id,
        |answer| async move { generate_feedback(&llm, &question, &answer).await },
    )
    .await?;
    Ok(Json(row.into()))
}

/// Charges one credit, generates feedback from the answer text and attaches
/// it. The credit is refunded if generation or the attach fails, including
/// when a concurrent request attached feedback first.
pub async fn feedback_for_iteration<F, Fut>(
    iterations: &dyn IterationStore,
    entitlements: &dyn EntitlementStore,
    id: Uuid,
    user_id: Uuid,
    generate: F,
) -> Result<AnswerIterationRow, AppError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Feedback, AppError>>,
{
    let iteration = iterations.get(id).await?;
    if iteration.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    if iteration.feedback.is_some() {
        return Err(already_has_feedback(id));
    }

    let answer = iteration.answer_text;
    charge_then(entitlements, user_id, FEEDBACK_COST, || async move {
        let feedback = generate(answer).await?;
        info!(
            "Feedback for iteration {id}: score {:?}, summary {} chars",
            feedback.score(),
            feedback.summary().len()
        );
        iterations.attach_feedback(id, &feedback).await
    })
    .await
}
