/// LLM Client — the single point of entry for all Claude API calls in Compass.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All LLM interactions MUST go through this module.
///
/// Two tiers are in play, selected by the engine rather than the caller's
/// request payload: `Structural` (cheap, near-zero temperature, used for
/// topic extraction, stage sequencing, and weekly outlines) and `Content`
/// (premium, used only for leaf-level user-visible section content).
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Structural-tier model. Intentionally hardcoded to prevent accidental drift.
pub const STRUCTURAL_MODEL: &str = "claude-haiku-4-5";
/// Content-tier model. Reserved for user-visible long-form section content.
pub const CONTENT_MODEL: &str = "claude-sonnet-4-5";
const MAX_RETRIES: u32 = 3;

/// Cost/quality tier for a generative call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Cheap and fast; deterministic settings for structural tasks.
    Structural,
    /// Premium; long-form section content only.
    Content,
}

impl Tier {
    pub fn model(self) -> &'static str {
        match self {
            Tier::Structural => STRUCTURAL_MODEL,
            Tier::Content => CONTENT_MODEL,
        }
    }

    fn max_tokens(self) -> u32 {
        match self {
            Tier::Structural => 4096,
            Tier::Content => 8192,
        }
    }

    /// Structural calls run at temperature 0.0 so repeated extraction of the
    /// same job description converges to the same topic set.
    fn temperature(self) -> f32 {
        match self {
            Tier::Structural => 0.0,
            Tier::Content => 0.7,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// The generative text contract consumed by the engine. Production uses
/// `AnthropicClient`; tests substitute scripted doubles.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Sends one prompt at the given tier and returns the raw text reply.
    async fn generate(&self, system: &str, prompt: &str, tier: Tier) -> Result<String, LlmError>;
}

/// Calls the generative tier and deserializes the reply as JSON.
/// The prompt must instruct the model to return valid JSON.
pub async fn generate_json<T: DeserializeOwned>(
    client: &dyn GenerativeClient,
    system: &str,
    prompt: &str,
    tier: Tier,
) -> Result<T, LlmError> {
    let text = client.generate(system, prompt, tier).await?;

    // Strip markdown code fences if the model wraps JSON in them
    let text = strip_json_fences(&text);

    serde_json::from_str(text).map_err(LlmError::Parse)
}

/// The single LLM client used by all services in Compass.
/// Wraps the Anthropic Messages API with retry logic and tier selection.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(
        &self,
        prompt: &str,
        system: &str,
        tier: Tier,
    ) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: tier.model(),
            max_tokens: tier.max_tokens(),
            temperature: tier.temperature(),
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: tier={:?}, input_tokens={}, output_tokens={}",
                tier, llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl GenerativeClient for AnthropicClient {
    async fn generate(&self, system: &str, prompt: &str, tier: Tier) -> Result<String, LlmError> {
        let response = self.call(prompt, system, tier).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        Ok(text.to_string())
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_structural_tier_is_deterministic_and_cheap() {
        assert_eq!(Tier::Structural.temperature(), 0.0);
        assert_eq!(Tier::Structural.model(), STRUCTURAL_MODEL);
    }

    #[test]
    fn test_content_tier_uses_premium_model() {
        assert_eq!(Tier::Content.model(), CONTENT_MODEL);
        assert!(Tier::Content.max_tokens() > Tier::Structural.max_tokens());
    }

    #[tokio::test]
    async fn test_generate_json_parses_fenced_output() {
        struct Fenced;

        #[async_trait]
        impl GenerativeClient for Fenced {
            async fn generate(
                &self,
                _system: &str,
                _prompt: &str,
                _tier: Tier,
            ) -> Result<String, LlmError> {
                Ok("```json\n{\"value\": 7}\n```".to_string())
            }
        }

        #[derive(Deserialize)]
        struct Out {
            value: u32,
        }

        let out: Out = generate_json(&Fenced, "sys", "prompt", Tier::Structural)
            .await
            .unwrap();
        assert_eq!(out.value, 7);
    }
}
