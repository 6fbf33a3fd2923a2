// overture/src/generative/client.rs

//! The boundary to the generative text service: the `TextGenerator` trait,
//! its configuration, and an OpenAI-compatible HTTP implementation.

use crate::error::{OvertureError, OvertureResult};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{event, instrument, Level};

/// Failure of a single generation attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
  /// Network, auth or timeout trouble. Eligible for retry.
  #[error("service unavailable: {0}")]
  Unavailable(String),
  /// The service answered with an error, or with something unusable.
  #[error("service error: {0}")]
  Service(String),
}

impl GenerationError {
  pub fn is_transient(&self) -> bool {
    matches!(self, GenerationError::Unavailable(_))
  }
}

/// Opaque text generation: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[async_trait]
impl TextGenerator for Arc<dyn TextGenerator> {
  async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
    (**self).generate(prompt).await
  }
}

/// Bounded exponential backoff for transient generation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the first attempt; `1` means at most two attempts.
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 2,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(8),
      multiplier: 2.0,
    }
  }
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `retry` (zero-based).
  pub fn backoff_for(&self, retry: u32) -> Duration {
    let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
    let millis = self.initial_backoff.as_millis() as f64 * factor;
    let capped = millis.min(self.max_backoff.as_millis() as f64);
    Duration::from_millis(capped as u64)
  }
}

/// Everything needed to reach the generative service.
///
/// Passed explicitly to the generator and to each generative step.
#[derive(Clone)]
pub struct GeneratorConfig {
  pub endpoint: String,
  pub api_key: Option<String>,
  pub model: String,
  pub temperature: f32,
  pub system_prompt: String,
  /// Cap on a single attempt.
  pub timeout: Duration,
  pub retry: RetryPolicy,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
      api_key: None,
      model: "gpt-4o-mini".to_string(),
      temperature: 0.7,
      system_prompt: "You are a composer's assistant. Reply with the requested artifact only, without commentary."
        .to_string(),
      timeout: Duration::from_secs(60),
      retry: RetryPolicy::default(),
    }
  }
}

// The API key must never reach logs.
impl std::fmt::Debug for GeneratorConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GeneratorConfig")
      .field("endpoint", &self.endpoint)
      .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
      .field("model", &self.model)
      .field("temperature", &self.temperature)
      .field("timeout", &self.timeout)
      .field("retry", &self.retry)
      .finish()
  }
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpTextGenerator {
  client: reqwest::Client,
  config: GeneratorConfig,
}

impl HttpTextGenerator {
  pub fn new(config: GeneratorConfig) -> OvertureResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| OvertureError::Configuration(format!("cannot build HTTP client: {}", e)))?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &GeneratorConfig {
    &self.config
  }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
  content: Option<String>,
}

/// Maps a non-success HTTP status onto the retryable / fatal split.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> GenerationError {
  let message = format!("HTTP {}: {}", status, body.trim());
  let transient = status.is_server_error()
    || matches!(
      status,
      StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    );
  if transient {
    GenerationError::Unavailable(message)
  } else {
    GenerationError::Service(message)
  }
}

fn parse_chat_response(text: &str) -> Result<String, GenerationError> {
  let parsed: ChatResponse =
    serde_json::from_str(text).map_err(|e| GenerationError::Service(format!("malformed response body: {}", e)))?;
  parsed
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message.content)
    .ok_or_else(|| GenerationError::Service("response contained no message content".to_string()))
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
  #[instrument(
    name = "HttpTextGenerator::generate",
    skip_all,
    fields(model = %self.config.model, prompt_len = prompt.len())
  )]
  async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
    let body = ChatRequest {
      model: &self.config.model,
      messages: vec![
        ChatMessage {
          role: "system",
          content: &self.config.system_prompt,
        },
        ChatMessage {
          role: "user",
          content: prompt,
        },
      ],
      temperature: self.config.temperature,
    };

    let mut request = self
      .client
      .post(&self.config.endpoint)
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .json(&body);
    if let Some(key) = &self.config.api_key {
      request = request.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let response = request
      .send()
      .await
      .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
    if !status.is_success() {
      event!(Level::WARN, %status, "Generative service returned an error status.");
      return Err(classify_status(status, &text));
    }

    let content = parse_chat_response(&text)?;
    event!(Level::DEBUG, response_len = content.len(), "Generative service responded.");
    Ok(content)
  }
}
