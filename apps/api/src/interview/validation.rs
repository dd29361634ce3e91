//! Answer validation heuristic.
//!
//! Pure and deterministic: the same text and question index always produce
//! the same result. Nothing here blocks submission; `submit_style` only tells
//! the client whether to ask for confirmation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::interview::thresholds::{thresholds_for, Thresholds};

/// Below this many words an answer is flagged as extreme.
pub const EXTREME_WORD_COUNT: usize = 20;
/// Above this repetition score an answer is flagged as extreme.
pub const EXTREME_REPETITION: f64 = 0.5;
/// How many of the most-repeated words feed the repetition score.
const TOP_REPEATED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    WordCount,
    SentenceCount,
    UniqueWords,
    Repetition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStyle {
    Advisory,
    ConfirmBeforeSubmit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub word_count: usize,
    pub sentence_count: usize,
    pub unique_word_count: usize,
    /// Share of all words taken by the most-repeated words, in [0, 1].
    pub repetition_score: f64,
    pub warnings: Vec<ValidationWarning>,
    pub is_valid: bool,
    pub is_extreme: bool,
    pub submit_style: SubmitStyle,
    pub thresholds: Thresholds,
}

/// Tokens that carry at least one letter or digit. Used for the unique-word
/// and repetition measures, where a stray `-` or `!` is not a word.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
}

fn normalize(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Whitespace-delimited tokens, punctuation-only tokens included.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Segments delimited by `.`, `!` or `?` that contain at least one
/// alphanumeric character.
pub fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|seg| seg.chars().any(char::is_alphanumeric))
        .count()
}

pub fn unique_word_count(text: &str) -> usize {
    words(text).map(normalize).collect::<HashSet<_>>().len()
}

/// Fraction of words accounted for by the top repeated words (those seen more
/// than once). Zero for empty text or text with no repeats.
pub fn repetition_score(text: &str) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for w in words(text) {
        *counts.entry(normalize(w)).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let mut repeated: Vec<usize> = counts.into_values().filter(|&c| c > 1).collect();
    repeated.sort_unstable_by(|a, b| b.cmp(a));
    let top: usize = repeated.iter().take(TOP_REPEATED).sum();

    (top as f64 / total as f64).clamp(0.0, 1.0)
}

pub fn validate(answer_text: &str, question_index: usize) -> ValidationResult {
    let thresholds = thresholds_for(question_index);

    let word_count = word_count(answer_text);
    let sentence_count = sentence_count(answer_text);
    let unique_word_count = unique_word_count(answer_text);
    let repetition_score = repetition_score(answer_text);

    let mut warnings = Vec::new();
    if word_count < thresholds.min_word_count {
        warnings.push(ValidationWarning {
            kind: WarningKind::WordCount,
            message: format!(
                "Your answer has {word_count} words; aim for at least {} to tell the full STAR story.",
                thresholds.min_word_count
            ),
        });
    }
    if sentence_count < thresholds.min_sentence_count {
        warnings.push(ValidationWarning {
            kind: WarningKind::SentenceCount,
            message: format!(
                "Your answer has {sentence_count} sentence(s); aim for at least {} so Situation, Task, Action and Result each get room.",
                thresholds.min_sentence_count
            ),
        });
    }
    if unique_word_count < thresholds.min_unique_words {
        warnings.push(ValidationWarning {
            kind: WarningKind::UniqueWords,
            message: format!(
                "Your answer uses {unique_word_count} distinct words; aim for at least {} by adding specific details.",
                thresholds.min_unique_words
            ),
        });
    }
    if repetition_score > EXTREME_REPETITION {
        warnings.push(ValidationWarning {
            kind: WarningKind::Repetition,
            message: "A few words make up most of your answer; vary your wording.".to_string(),
        });
    }

    let is_valid = word_count >= thresholds.min_word_count
        && sentence_count >= thresholds.min_sentence_count
        && unique_word_count >= thresholds.min_unique_words;
    let is_extreme = word_count < EXTREME_WORD_COUNT || repetition_score > EXTREME_REPETITION;

    ValidationResult {
        word_count,
        sentence_count,
        unique_word_count,
        repetition_score,
        warnings,
        is_valid,
        is_extreme,
        submit_style: if is_extreme {
            SubmitStyle::ConfirmBeforeSubmit
        } else {
            SubmitStyle::Advisory
        },
        thresholds,
    }
}
