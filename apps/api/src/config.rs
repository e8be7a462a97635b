use std::collections::BTreeSet;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub retrieval_endpoint: String,
    pub retrieval_api_key: String,
    /// Minimum best-source similarity for a topic to count as covered.
    /// Deployment-tuned; the boundary is inclusive.
    pub coverage_threshold: f32,
    /// Per-chunk similarity floor for the `chunks_above_threshold` tally.
    pub chunk_score_threshold: f32,
    pub retrieval_top_k: usize,
    /// Vector-index namespaces searched for every topic.
    pub namespaces: Vec<String>,
    /// Namespace whose sources are crawled web pages rather than books.
    pub web_namespace: String,
    pub role_templates_path: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            retrieval_endpoint: require_env("RETRIEVAL_ENDPOINT")?,
            retrieval_api_key: require_env("RETRIEVAL_API_KEY")?,
            coverage_threshold: parse_env("COVERAGE_THRESHOLD", 0.55)?,
            chunk_score_threshold: parse_env("CHUNK_SCORE_THRESHOLD", 0.35)?,
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K", 10)?,
            namespaces: std::env::var("RETRIEVAL_NAMESPACES")
                .unwrap_or_else(|_| "books,web".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            web_namespace: std::env::var("WEB_NAMESPACE").unwrap_or_else(|_| "web".to_string()),
            role_templates_path: std::env::var("ROLE_TEMPLATES_PATH")
                .unwrap_or_else(|_| "config/role_templates.json".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid number")),
        Err(_) => Ok(default),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Role templates
// ────────────────────────────────────────────────────────────────────────────

/// The small bounded set of common role archetypes that share cache entries.
///
/// Loaded from a JSON file (an array of role-type strings) rather than
/// compiled into the binary, so operators can adjust the set without a
/// deploy. Every role type outside this set falls back to content-hash
/// cache keys.
#[derive(Debug, Clone, Default)]
pub struct RoleTemplates {
    roles: BTreeSet<String>,
}

impl RoleTemplates {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read role templates from '{path}'"))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let roles: Vec<String> =
            serde_json::from_str(raw).context("Role templates file must be a JSON string array")?;
        Ok(Self {
            roles: roles.into_iter().map(|r| normalize_role(&r)).collect(),
        })
    }

    /// Whether the role type is one of the configured common templates.
    pub fn contains(&self, role_type: &str) -> bool {
        self.roles.contains(&normalize_role(role_type))
    }

    /// The template vocabulary, for injection into extraction prompts.
    pub fn vocabulary(&self) -> Vec<&str> {
        self.roles.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Normalizes a role type for set membership: lowercase, trimmed,
/// whitespace collapsed to underscores.
pub fn normalize_role(role: &str) -> String {
    role.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
