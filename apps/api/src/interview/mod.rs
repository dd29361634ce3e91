// Interview practice: question generation, answer iterations, validation, feedback.
// All LLM calls go through llm_client.

pub mod feedback;
pub mod handlers;
pub mod iterations;
pub mod prompts;
pub mod questions;
pub mod thresholds;
pub mod validation;
