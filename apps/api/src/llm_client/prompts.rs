// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Common instruction appended to all grounded generation prompts.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Base every teaching claim on the SOURCE EXCERPTS provided in \
    the context block. Do NOT rely on unconstrained recall for formulas, \
    definitions, or numeric values. When an excerpt names a book chapter, \
    attribute material drawn from it to that chapter.";

/// Instruction forbidding generic, content-free titles.
pub const SPECIFICITY_INSTRUCTION: &str = "\
    CRITICAL: Titles must name concrete material — like 'Black-Scholes \
    Formula Derivation', never 'Introduction to Options' or 'Overview of \
    Statistics'. Never begin a title with 'Introduction to', 'Overview of', \
    'Basics of', or 'Fundamentals of'.";
