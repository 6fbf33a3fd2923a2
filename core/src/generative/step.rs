// overture/src/generative/step.rs

use crate::core::state::{Field, StepInput};
use crate::core::step::{StepDef, StepTransform};
use crate::error::{OvertureError, OvertureResult};
use crate::generative::client::{GenerationError, GeneratorConfig, RetryPolicy, TextGenerator};
use crate::generative::template::PromptTemplate;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, instrument, Level};

/// One templated call to the generative service, with per-attempt timeout
/// and bounded retry of transient failures.
///
/// The returned text is trusted as-is apart from trimming and fence removal;
/// validating what it means is up to whichever step consumes it.
pub struct GenerativeStep {
  template: PromptTemplate,
  generator: Arc<dyn TextGenerator>,
  retry: RetryPolicy,
  timeout: Duration,
}

impl GenerativeStep {
  pub fn new(template: PromptTemplate, generator: Arc<dyn TextGenerator>, retry: RetryPolicy, timeout: Duration) -> Self {
    Self {
      template,
      generator,
      retry,
      timeout,
    }
  }

  pub fn from_config(template: PromptTemplate, generator: Arc<dyn TextGenerator>, config: &GeneratorConfig) -> Self {
    Self::new(template, generator, config.retry.clone(), config.timeout)
  }

  pub fn template(&self) -> &PromptTemplate {
    &self.template
  }

  /// Wraps this step into a `StepDef` whose inputs are the template's fields.
  pub fn into_step_def(self, name: impl Into<String>, output: Field) -> StepDef {
    let inputs = self.template.fields().to_vec();
    StepDef::new(name, &inputs, output, self)
  }

  async fn attempt(&self, prompt: &str) -> Result<String, GenerationError> {
    match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
      Ok(result) => result,
      Err(_) => Err(GenerationError::Unavailable(format!(
        "no response within {} ms",
        self.timeout.as_millis()
      ))),
    }
  }

  #[instrument(name = "GenerativeStep::generate", skip_all, fields(step_name = %input.step_name()))]
  pub async fn generate(&self, input: &StepInput) -> OvertureResult<String> {
    let prompt = self.template.render(input)?;
    let mut retry = 0u32;
    loop {
      match self.attempt(&prompt).await {
        Ok(text) => {
          let cleaned = clean_output(&text);
          if cleaned.is_empty() {
            return Err(OvertureError::ServiceError {
              message: "service returned an empty response".to_string(),
            });
          }
          return Ok(cleaned);
        }
        Err(GenerationError::Unavailable(message)) if retry < self.retry.max_retries => {
          let delay = self.retry.backoff_for(retry);
          event!(
            Level::WARN,
            attempt = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "Transient generation failure, backing off."
          );
          tokio::time::sleep(delay).await;
          retry += 1;
        }
        Err(GenerationError::Unavailable(message)) => {
          return Err(OvertureError::ServiceError {
            message: format!("service unavailable after {} attempt(s): {}", retry + 1, message),
          });
        }
        Err(err @ GenerationError::Service(_)) => return Err(err.into()),
      }
    }
  }
}

#[async_trait]
impl StepTransform for GenerativeStep {
  async fn run(&self, input: StepInput) -> OvertureResult<String> {
    self.generate(&input).await
  }
}

/// Trims model output and strips one surrounding Markdown code fence.
pub fn clean_output(text: &str) -> String {
  let trimmed = text.trim();
  if let Some(rest) = trimmed.strip_prefix("```") {
    if let Some(body) = rest.strip_suffix("```") {
      // Drop the info string (e.g. `json`) on the opening fence line.
      let body = match body.find('\n') {
        Some(nl) => &body[nl + 1..],
        None => body,
      };
      return body.trim().to_string();
    }
  }
  trimmed.to_string()
}
