// All LLM prompt constants for the Analyzer module.

/// System prompt for job-profile extraction — enforces JSON-only output.
pub const ANALYZE_SYSTEM: &str =
    "You are an expert job description analyst for technical and quantitative roles. \
    Extract the specific skills a candidate must study. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Extraction prompt template.
/// Replace `{jd_text}`, `{role_vocabulary}`, `{seniority_hint}` before sending.
pub const ANALYZE_PROMPT_TEMPLATE: &str = r#"Analyze the following job description and extract the topics a candidate must study to qualify for the role.

Return a JSON object with this EXACT schema (no extra fields):
{
  "role_type": "quantitative_researcher",
  "seniority": "senior",
  "explicit_topics": [
    {
      "name": "stochastic calculus",
      "keywords": ["Ito's lemma", "Brownian motion", "martingales"],
      "context": "needed for derivatives pricing models mentioned in the requirements"
    }
  ],
  "implicit_topics": [
    {
      "name": "numerical linear algebra",
      "keywords": ["matrix decomposition", "eigenvalues"],
      "context": "typically required for the modeling work this role describes"
    }
  ]
}

Rules for extraction:

ROLE TYPE: pick from this vocabulary when the role clearly matches one entry, otherwise use "other":
{role_vocabulary}

SENIORITY: "junior", "mid", "senior", "staff", "principal", or "unknown".{seniority_hint}

EXPLICIT TOPICS: skills named verbatim in the text. PRESERVE the literal terminology — if the text says "sentiment and flow indicators", extract "sentiment indicators" and "flow indicators" as two topics; do NOT abstract them into "market knowledge".

IMPLICIT TOPICS: skills the role typically requires that are not literally stated.

SPECIFICITY: every topic name must be a concrete, studyable subject. NEVER emit vague umbrella names like "market knowledge", "data handling", or "communication skills". Split compound phrases into separate specific topics.

KEYWORDS: 2-5 short terms per topic that would appear in a textbook chapter or documentation page on that topic.

JOB DESCRIPTION:
{jd_text}"#;
