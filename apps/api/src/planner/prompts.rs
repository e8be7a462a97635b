// All LLM prompt constants for the Planner module.

/// System prompt for stage sequencing — enforces JSON-only output.
pub const SEQUENCE_SYSTEM: &str =
    "You are an expert curriculum designer for technical and quantitative careers. \
    Order topics into progressive learning stages. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Stage sequencing prompt template.
/// Replace `{topics_json}` and `{role_type}` before sending.
pub const SEQUENCE_PROMPT_TEMPLATE: &str = r#"Group the following topics into ordered learning stages for a candidate targeting a {role_type} role.

COVERED TOPICS (name + why the role needs it):
{topics_json}

Return a JSON object with this EXACT schema (no extra fields):
{
  "stages": [
    {
      "name": "Foundation",
      "duration_weeks": 3,
      "topics": ["probability theory", "linear algebra"]
    }
  ]
}

Rules for sequencing:
1. Produce 3 to 5 stages, ordered foundation -> advanced (e.g. "Foundation", "Core Methods", "Advanced / Interview-Specific").
2. Order by topic interdependency — prerequisites come in earlier stages. NEVER use alphabetical or input order.
3. Every stage gets a duration_weeks estimate between 1 and 6.
4. Use ONLY topic names from the list above, spelled exactly as given.
5. Assign every topic to exactly one stage.
6. Stage names must reflect the actual material, not placeholders."#;
