use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnswerIterationRow {
    pub id: Uuid,
    pub job_application_id: Uuid,
    pub user_id: Uuid,
    pub question_index: i32,
    pub iteration: i32,
    pub answer_text: String,
    /// Tagged `Feedback` JSON; immutable once set.
    pub feedback: Option<Value>,
    pub created_at: DateTime<Utc>,
}
