//! Completion API client
//!
//! One request per turn, no retries: any transport or API failure is
//! returned to the caller, which treats it as fatal.

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{Engine, SessionConfig};

/// Default base URL of the completion service
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Upper bound on generated tokens; a command is one short line
pub const MAX_COMPLETION_TOKENS: u32 = 128;

/// Generation stops at the end of the first line
const STOP_SEQUENCE: &str = "\n";

/// Sampling parameters chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub frequency_penalty: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            frequency_penalty: 1.0,
        }
    }
}

/// Body of `POST /completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: &'a str,
    pub echo: bool,
}

/// Response from `/completions`; only the choices matter here
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub text: String,
}

/// Error type for completion requests
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("completion response contained no choices")]
    NoChoices,
}

/// Source of next-command suggestions
pub trait Completer {
    /// Complete `prompt`, returning the suggested line without trailing
    /// whitespace
    fn complete(&self, prompt: &str)
        -> impl Future<Output = Result<String, CompletionError>> + Send;
}

/// Client for the completion service's HTTP API
#[derive(Clone)]
pub struct CompletionClient {
    base_url: String,
    api_key: String,
    engine: Engine,
    sampling: Sampling,
    client: reqwest::Client,
}

impl CompletionClient {
    /// Create a new completion client
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://api.openai.com/v1"
    /// * `api_key` - bearer token
    /// * `engine` - model to request
    /// * `sampling` - temperature and frequency penalty
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine: Engine,
        sampling: Sampling,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            engine,
            sampling,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.engine,
            config.sampling,
        )
    }

    /// Request body for `prompt` with the fixed sampling settings
    pub fn request_body<'a>(&'a self, prompt: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: self.engine.model_name(),
            prompt,
            temperature: self.sampling.temperature,
            frequency_penalty: self.sampling.frequency_penalty,
            top_p: 1.0,
            max_tokens: MAX_COMPLETION_TOKENS,
            stop: STOP_SEQUENCE,
            echo: false,
        }
    }

    /// Issue one completion request and return the first choice's text,
    /// right-trimmed
    pub async fn create_completion(&self, prompt: &str) -> Result<String, CompletionError> {
        let endpoint = format!("{}/completions", self.base_url.trim_end_matches('/'));
        let started = Instant::now();

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?;

        debug!(
            model = self.engine.model_name(),
            prompt_bytes = prompt.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Completion received"
        );

        Ok(choice.text.trim_end().to_string())
    }
}

impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.create_completion(prompt).await
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("base_url", &self.base_url)
            .field("engine", &self.engine)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_serialization() {
        let client = CompletionClient::new(
            DEFAULT_API_BASE,
            "sk-test",
            Engine::CodeCushman001,
            Sampling {
                temperature: 0.5,
                frequency_penalty: -1.0,
            },
        );

        let json = serde_json::to_value(client.request_body("$ ")).unwrap();

        assert_eq!(json["model"], "code-cushman-001");
        assert_eq!(json["prompt"], "$ ");
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["frequency_penalty"], -1.0);
        assert_eq!(json["top_p"], 1.0);
        assert_eq!(json["max_tokens"], 128);
        assert_eq!(json["stop"], "\n");
        assert_eq!(json["echo"], false);
    }

    #[test]
    fn test_response_parsing_tolerates_extra_fields() {
        let body = r#"{"id":"cmpl-1","object":"text_completion","choices":[{"text":"ls -la  ","index":0,"finish_reason":"stop"}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].text, "ls -la  ");
    }

    #[test]
    fn test_debug_hides_key() {
        let client =
            CompletionClient::new(DEFAULT_API_BASE, "sk-secret", Engine::default(), Sampling::default());
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }
}
