use serde::Serialize;

/// Minimums an answer should reach for a given question position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub min_word_count: usize,
    pub min_sentence_count: usize,
    pub min_unique_words: usize,
}

/// Later questions in a session ask for longer, richer answers.
const THRESHOLD_TABLE: [Thresholds; 5] = [
    Thresholds {
        min_word_count: 50,
        min_sentence_count: 3,
        min_unique_words: 20,
    },
    Thresholds {
        min_word_count: 60,
        min_sentence_count: 3,
        min_unique_words: 25,
    },
    Thresholds {
        min_word_count: 70,
        min_sentence_count: 4,
        min_unique_words: 30,
    },
    Thresholds {
        min_word_count: 80,
        min_sentence_count: 4,
        min_unique_words: 35,
    },
    Thresholds {
        min_word_count: 90,
        min_sentence_count: 5,
        min_unique_words: 40,
    },
];

/// Thresholds for a zero-based question index. Indices past the table reuse
/// the last row.
pub fn thresholds_for(question_index: usize) -> Thresholds {
    THRESHOLD_TABLE[question_index.min(THRESHOLD_TABLE.len() - 1)]
}
