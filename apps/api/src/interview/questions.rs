//! Question generation: resume + job description in, a fixed-size list of
//! behavioral questions out.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::interview::prompts::{QUESTION_PROMPT_TEMPLATE, QUESTION_SYSTEM};
use crate::llm_client::LlmClient;

pub const QUESTIONS_PER_SESSION: usize = 5;
/// Inputs longer than this are cut before being placed in the prompt.
const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewQuestion {
    pub question: String,
    #[serde(default)]
    pub competency: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionSet {
    questions: Vec<InterviewQuestion>,
}

pub async fn generate_questions(
    llm: &LlmClient,
    resume_text: &str,
    job_description: &str,
) -> Result<Vec<InterviewQuestion>, AppError> {
    let prompt = build_prompt(resume_text, job_description);
    let set: QuestionSet = llm
        .call_json(&prompt, QUESTION_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Question generation failed: {e}")))?;
    normalize_questions(set.questions)
}

fn build_prompt(resume_text: &str, job_description: &str) -> String {
    QUESTION_PROMPT_TEMPLATE
        .replace("{count}", &QUESTIONS_PER_SESSION.to_string())
        .replace("{resume_text}", truncate_chars(resume_text.trim(), MAX_INPUT_CHARS))
        .replace(
            "{job_description}",
            truncate_chars(job_description.trim(), MAX_INPUT_CHARS),
        )
}

/// Drops blank questions and keeps at most `QUESTIONS_PER_SESSION`.
fn normalize_questions(questions: Vec<InterviewQuestion>) -> Result<Vec<InterviewQuestion>, AppError> {
    let questions: Vec<_> = questions
        .into_iter()
        .filter(|q| !q.question.trim().is_empty())
        .map(|q| InterviewQuestion {
            question: q.question.trim().to_string(),
            ..q
        })
        .take(QUESTIONS_PER_SESSION)
        .collect();

    if questions.is_empty() {
        return Err(AppError::Llm("Question generation returned no questions".to_string()));
    }
    Ok(questions)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str) -> InterviewQuestion {
        InterviewQuestion {
            question: text.to_string(),
            competency: "ownership".to_string(),
            rationale: None,
        }
    }

    #[test]
    fn test_normalize_caps_at_session_size() {
        let many: Vec<_> = (0..8).map(|i| q(&format!("Question {i}?"))).collect();
        let out = normalize_questions(many).unwrap();
        assert_eq!(out.len(), QUESTIONS_PER_SESSION);
        assert_eq!(out[0].question, "Question 0?");
    }

    #[test]
    fn test_normalize_drops_blank_questions() {
        let out = normalize_questions(vec![q("  "), q(" Tell me about a conflict. ")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].question, "Tell me about a conflict.");
    }

    #[test]
    fn test_normalize_rejects_empty_set() {
        assert!(matches!(normalize_questions(vec![]), Err(AppError::Llm(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_prompt_includes_inputs() {
        let p = build_prompt("Rust engineer at Acme", "Senior backend role");
        assert!(p.contains("Rust engineer at Acme"));
        assert!(p.contains("Senior backend role"));
        assert!(p.contains("exactly 5"));
    }

    #[test]
    fn test_question_defaults_when_fields_missing() {
        let set: QuestionSet =
            serde_json::from_str(r#"{"questions":[{"question":"Why us?"}]}"#).unwrap();
        assert_eq!(set.questions[0].competency, "");
        assert!(set.questions[0].rationale.is_none());
    }
}
