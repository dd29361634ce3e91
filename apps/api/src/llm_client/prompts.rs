// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it; this file holds the cross-cutting pieces.

/// Describes the STAR structure. Guidance only; nothing enforces it.
pub const STAR_DEFINITION: &str = "\
    STAR = Situation (context), Task (the candidate's responsibility), \
    Action (what the candidate personally did), Result (measurable outcome).";
