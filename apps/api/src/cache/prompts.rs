// All LLM prompt constants for the cache generation paths.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for weekly-outline generation — enforces JSON-only output.
pub const STRUCTURE_SYSTEM: &str =
    "You are an expert instructor designing a study outline grounded in real source material. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Topic-structure prompt template.
/// Replace: {grounding_instruction}, {specificity_instruction}, {topic_name},
///          {keywords}, {grounding}
pub const STRUCTURE_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

{specificity_instruction}

Design a weekly study outline for the topic "{topic_name}".
Keywords the candidate's target role emphasizes: {keywords}

SOURCE EXCERPTS (ground every section in these):
{grounding}

Return a JSON object with this EXACT schema (no extra fields):
{
  "weeks": [
    {
      "title": "Pricing Under No-Arbitrage",
      "sections": [
        {
          "title": "Black-Scholes Formula Derivation",
          "summary": "One sentence on what this section teaches."
        }
      ]
    }
  ],
  "estimated_hours": 12,
  "difficulty_level": "intermediate",
  "source_books": ["Options, Futures, and Other Derivatives"]
}

HARD RULES:
1. Produce 2 to 4 weeks, each with 2 to 4 sections
2. Every section title must name concrete material from the excerpts
3. difficulty_level is one of "introductory", "intermediate", "advanced"
4. source_books lists only sources that actually appear in the excerpts"#;

/// System prompt for section-content generation — enforces JSON-only output.
pub const CONTENT_SYSTEM: &str =
    "You are an expert teacher writing polished long-form study material grounded in real \
    source excerpts, for a candidate preparing for a specific role. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Section-content prompt template.
/// Replace: {grounding_instruction}, {specificity_instruction}, {topic_name},
///          {section_title}, {grounding}
pub const CONTENT_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

{specificity_instruction}

Write the full study material for the section "{section_title}" of the topic "{topic_name}".

SOURCE EXCERPTS (ground every claim in these):
{grounding}

Return a JSON object with this EXACT schema (no extra fields):
{
  "introduction": "Two or three sentences framing why this section matters for the role.",
  "sections": [
    {
      "title": "Deriving the Hedge Ratio",
      "body": "Rich explanatory prose. Several paragraphs.",
      "key_formula": "delta = N(d1)"
    }
  ],
  "key_takeaways": ["One-sentence takeaway"],
  "practical_tips": ["Actionable study or interview tip"],
  "practice_problems": [
    {
      "question": "A concrete exercise",
      "difficulty": "easy",
      "answer_outline": "The key steps of the solution"
    }
  ],
  "source_attributions": ["Options, Futures, and Other Derivatives — Ch. 19"]
}

HARD RULES:
1. Produce 2 to 4 sections; key_formula may be null when no formula applies
2. Grade practice_problems across difficulties: "easy", "medium", "hard"
3. Attribute every borrowed formula or definition in source_attributions
4. Do NOT invent numeric constants or formulas absent from the excerpts"#;
