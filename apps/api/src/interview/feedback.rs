//! Feedback records, as a tagged enum.
//!
//! The AI proxy has produced two shapes over time: a plain `{feedback, score}`
//! object and a structured STAR breakdown. Both are converted once, at the
//! boundary, into `Feedback` with an explicit `kind` discriminant; everything
//! downstream (storage included) sees only the tagged form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::errors::AppError;
use crate::interview::prompts::{FEEDBACK_PROMPT_TEMPLATE, FEEDBACK_SYSTEM};
use crate::llm_client::prompts::STAR_DEFINITION;
use crate::llm_client::LlmClient;

pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Error)]
pub enum FeedbackShapeError {
    #[error("unrecognized feedback shape")]
    Unrecognized,

    #[error("malformed feedback: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarAssessment {
    pub situation: String,
    pub task: String,
    pub action: String,
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedFeedback {
    #[serde(alias = "score")]
    pub overall_score: u8,
    pub star: StarAssessment,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Legacy { text: String, score: Option<u8> },
    Enhanced(EnhancedFeedback),
}

impl Feedback {
    /// Converts whatever the AI proxy returned into a tagged record.
    ///
    /// Already-tagged values are accepted as-is. Otherwise a `star`,
    /// `strengths` or `improvements` field marks the enhanced shape and a
    /// string `feedback` field marks the legacy one.
    pub fn from_proxy(value: Value) -> Result<Self, FeedbackShapeError> {
        let obj = value.as_object().ok_or(FeedbackShapeError::Unrecognized)?;

        if obj.contains_key("kind") {
            return Ok(serde_json::from_value::<Feedback>(value)?.clamped());
        }

        if ["star", "strengths", "improvements"]
            .iter()
            .any(|k| obj.contains_key(*k))
        {
            let enhanced: EnhancedFeedback = serde_json::from_value(value)?;
            return Ok(Feedback::Enhanced(enhanced).clamped());
        }

        if let Some(text) = obj.get("feedback").and_then(Value::as_str) {
            let score = obj
                .get("score")
                .and_then(Value::as_u64)
                .map(|s| s.min(MAX_SCORE as u64) as u8);
            return Ok(Feedback::Legacy {
                text: text.to_string(),
                score,
            });
        }

        Err(FeedbackShapeError::Unrecognized)
    }

    pub fn score(&self) -> Option<u8> {
        match self {
            Feedback::Legacy { score, .. } => *score,
            Feedback::Enhanced(e) => Some(e.overall_score),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Feedback::Legacy { text, .. } => text,
            Feedback::Enhanced(e) => &e.summary,
        }
    }

    fn clamped(self) -> Self {
        match self {
            Feedback::Legacy { text, score } => Feedback::Legacy {
                text,
                score: score.map(|s| s.min(MAX_SCORE)),
            },
            Feedback::Enhanced(mut e) => {
                e.overall_score = e.overall_score.min(MAX_SCORE);
                Feedback::Enhanced(e)
            }
        }
    }
}

/// Asks the LLM to grade `answer` and converts the reply at the boundary.
pub async fn generate_feedback(
    llm: &LlmClient,
    question: &str,
    answer: &str,
) -> Result<Feedback, AppError> {
    let prompt = FEEDBACK_PROMPT_TEMPLATE
        .replace("{star_definition}", STAR_DEFINITION)
        .replace("{question}", question.trim())
        .replace("{answer}", answer.trim());
    let raw: Value = llm
        .call_json(&prompt, FEEDBACK_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Feedback generation failed: {e}")))?;
    Feedback::from_proxy(raw).map_err(|e| AppError::Llm(format!("Feedback reply rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_shape() {
        let f = Feedback::from_proxy(json!({"feedback": "Add a result.", "score": 6})).unwrap();
        assert_eq!(
            f,
            Feedback::Legacy {
                text: "Add a result.".into(),
                score: Some(6)
            }
        );
    }

    #[test]
    fn test_enhanced_shape() {
        let f = Feedback::from_proxy(json!({
            "overall_score": 8,
            "star": {"situation": "Clear", "task": "Clear", "action": "Specific", "result": "Missing metric"},
            "strengths": ["Ownership"],
            "improvements": ["Quantify the outcome"],
            "summary": "Solid answer."
        }))
        .unwrap();
        match &f {
            Feedback::Enhanced(e) => {
                assert_eq!(e.overall_score, 8);
                assert_eq!(e.star.result, "Missing metric");
                assert_eq!(e.improvements.len(), 1);
            }
            other => panic!("expected enhanced, got {other:?}"),
        }
        assert_eq!(f.summary(), "Solid answer.");
    }

    #[test]
    fn test_tagged_value_round_trips_through_storage() {
        let original = Feedback::Legacy {
            text: "ok".into(),
            score: None,
        };
        let stored = serde_json::to_value(&original).unwrap();
        assert_eq!(stored["kind"], "legacy");
        assert_eq!(Feedback::from_proxy(stored).unwrap(), original);
    }

    #[test]
    fn test_scores_are_clamped() {
        let f = Feedback::from_proxy(json!({"feedback": "x", "score": 99})).unwrap();
        assert_eq!(f.score(), Some(MAX_SCORE));
        let f = Feedback::from_proxy(json!({"score": 42, "strengths": []})).unwrap();
        assert_eq!(f.score(), Some(MAX_SCORE));
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        assert!(matches!(
            Feedback::from_proxy(json!({"error": "rate limited"})),
            Err(FeedbackShapeError::Unrecognized)
        ));
        assert!(Feedback::from_proxy(json!("just text")).is_err());
    }
}
