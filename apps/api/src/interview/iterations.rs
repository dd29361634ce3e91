use std::future::Future;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::feedback::Feedback;
use crate::models::answer::AnswerIterationRow;

/// Two submits for the same question can compute the same next iteration
/// number; the loser retries this many times in total.
const MAX_APPEND_ATTEMPTS: usize = 2;

/// Parameters for appending a new answer iteration.
#[derive(Debug, Clone)]
pub struct NewIteration {
    pub user_id: Uuid,
    pub job_application_id: Uuid,
    pub question_index: i32,
    pub answer_text: String,
}

/// Storage for answer iterations.
/// CRITICAL: This is append-only. Earlier iterations are never updated,
/// except for attaching feedback once.
#[async_trait]
pub trait IterationStore: Send + Sync {
    /// Appends the next iteration for (job application, question index).
    async fn append(&self, new: NewIteration) -> Result<AnswerIterationRow, AppError>;

    /// All iterations for one question, oldest first. The last one is current.
    async fn list(
        &self,
        job_application_id: Uuid,
        question_index: i32,
    ) -> Result<Vec<AnswerIterationRow>, AppError>;

    async fn get(&self, id: Uuid) -> Result<AnswerIterationRow, AppError>;

    /// Attaches feedback once. A second attach fails with a validation error
    /// and leaves the stored feedback untouched.
    async fn attach_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<AnswerIterationRow, AppError>;
}

pub fn already_has_feedback(id: Uuid) -> AppError {
    AppError::Validation(format!("Answer iteration {id} already has feedback"))
}

pub enum AppendError {
    /// Iteration number already taken by a concurrent submit.
    Conflict,
    Failed(AppError),
}

impl From<sqlx::Error> for AppendError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppendError::Conflict,
            _ => AppendError::Failed(e.into()),
        }
    }
}

/// Runs `insert` until it succeeds, fails for a reason other than a conflict,
/// or `MAX_APPEND_ATTEMPTS` is reached.
pub async fn append_with_retry<F, Fut>(mut insert: F) -> Result<AnswerIterationRow, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<AnswerIterationRow, AppendError>>,
{
    for attempt in 1..=MAX_APPEND_ATTEMPTS {
        match insert().await {
            Ok(row) => return Ok(row),
            Err(AppendError::Failed(e)) => return Err(e),
            Err(AppendError::Conflict) => {
                warn!("Iteration number taken by a concurrent submit (attempt {attempt})");
            }
        }
    }
    Err(AppError::Validation(
        "Another answer to this question was submitted at the same time; please retry"
            .to_string(),
    ))
}

pub struct PgIterationStore {
    pool: PgPool,
}

impl PgIterationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_next(&self, new: &NewIteration) -> Result<AnswerIterationRow, AppendError> {
        Ok(sqlx::query_as::<_, AnswerIterationRow>(
            r#"
            INSERT INTO answer_iterations
                (job_application_id, user_id, question_index, iteration, answer_text)
            SELECT $1, $2, $3, COALESCE(MAX(iteration), 0) + 1, $4
            FROM answer_iterations
            WHERE job_application_id = $1 AND question_index = $3
            RETURNING *
            "#,
        )
        .bind(new.job_application_id)
        .bind(new.user_id)
        .bind(new.question_index)
        .bind(&new.answer_text)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl IterationStore for PgIterationStore {
    async fn append(&self, new: NewIteration) -> Result<AnswerIterationRow, AppError> {
        let row = append_with_retry(|| self.insert_next(&new)).await?;
        info!(
            "Appended iteration {} for application {} question {}",
            row.iteration, row.job_application_id, row.question_index
        );
        Ok(row)
    }

    async fn list(
        &self,
        job_application_id: Uuid,
        question_index: i32,
    ) -> Result<Vec<AnswerIterationRow>, AppError> {
        Ok(sqlx::query_as::<_, AnswerIterationRow>(
            r#"
            SELECT * FROM answer_iterations
            WHERE job_application_id = $1 AND question_index = $2
            ORDER BY iteration ASC
            "#,
        )
        .bind(job_application_id)
        .bind(question_index)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get(&self, id: Uuid) -> Result<AnswerIterationRow, AppError> {
        sqlx::query_as::<_, AnswerIterationRow>("SELECT * FROM answer_iterations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Answer iteration {id} not found")))
    }

    async fn attach_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<AnswerIterationRow, AppError> {
        let value = serde_json::to_value(feedback).map_err(anyhow::Error::from)?;
        let updated = sqlx::query_as::<_, AnswerIterationRow>(
            "UPDATE answer_iterations SET feedback = $2 WHERE id = $1 AND feedback IS NULL RETURNING *",
        )
        .bind(id)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(row),
            None => {
                // Distinguish a missing row from one that already has feedback.
                self.get(id).await?;
                Err(already_has_feedback(id))
            }
        }
    }
}

/// Decodes stored feedback, if any.
pub fn stored_feedback(row: &AnswerIterationRow) -> Option<Feedback> {
    row.feedback
        .clone()
        .and_then(|v| Feedback::from_proxy(v).ok())
}
