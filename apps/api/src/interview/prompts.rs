// Interview LLM prompt templates.
// All prompts for the interview module are defined here.

pub const QUESTION_SYSTEM: &str = "\
You are an experienced hiring manager preparing a behavioral interview. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Every question must be answerable with a STAR story drawn from the candidate's resume.";

pub const QUESTION_PROMPT_TEMPLATE: &str = r#"Write exactly {count} behavioral interview questions for this candidate and role.
Order them from warm-up to most demanding.

RESUME:
{resume_text}

JOB DESCRIPTION:
{job_description}

OUTPUT SCHEMA (return exactly this structure):
{
  "questions": [
    {"question": "string", "competency": "string", "rationale": "string"}
  ]
}"#;

pub const FEEDBACK_SYSTEM: &str = "\
You are a supportive but rigorous interview coach. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Judge the answer against the STAR method and be specific about what is missing.";

pub const FEEDBACK_PROMPT_TEMPLATE: &str = r#"Evaluate this answer to a behavioral interview question.

{star_definition}

QUESTION:
{question}

ANSWER:
{answer}

OUTPUT SCHEMA (return exactly this structure):
{
  "overall_score": 0-10,
  "star": {"situation": "string", "task": "string", "action": "string", "result": "string"},
  "strengths": ["string"],
  "improvements": ["string"],
  "summary": "string"
}"#;
