// overture/src/config.rs

//! Runtime configuration loaded from the environment (and `.env`, if present).

use crate::error::{OvertureError, OvertureResult};
use crate::generative::client::{GeneratorConfig, RetryPolicy};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{event, Level};

pub const ENV_ENDPOINT: &str = "OVERTURE_ENDPOINT";
pub const ENV_API_KEY: &str = "OVERTURE_API_KEY";
pub const ENV_MODEL: &str = "OVERTURE_MODEL";
pub const ENV_TEMPERATURE: &str = "OVERTURE_TEMPERATURE";
pub const ENV_TIMEOUT_SECS: &str = "OVERTURE_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "OVERTURE_MAX_RETRIES";
pub const ENV_INITIAL_BACKOFF_MS: &str = "OVERTURE_INITIAL_BACKOFF_MS";
pub const ENV_CHECKPOINT_DIR: &str = "OVERTURE_CHECKPOINT_DIR";
pub const ENV_OUTPUT_DIR: &str = "OVERTURE_OUTPUT_DIR";

#[derive(Debug, Clone)]
pub struct OvertureConfig {
  pub generator: GeneratorConfig,
  pub checkpoint_dir: PathBuf,
  pub output_dir: PathBuf,
}

impl Default for OvertureConfig {
  fn default() -> Self {
    Self {
      generator: GeneratorConfig::default(),
      checkpoint_dir: PathBuf::from("checkpoints"),
      output_dir: PathBuf::from("output"),
    }
  }
}

impl OvertureConfig {
  pub fn from_env() -> OvertureResult<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Builds the configuration from an arbitrary variable source. Unset or
  /// blank variables fall back to defaults; unparsable ones are errors.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OvertureResult<Self> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let defaults = Self::default();
    let default_gen = defaults.generator;

    let temperature = parse_or(&get, ENV_TEMPERATURE, default_gen.temperature)?;
    if !(0.0..=2.0).contains(&temperature) {
      return Err(OvertureError::Configuration(format!(
        "{} must be within 0.0..=2.0, got {}",
        ENV_TEMPERATURE, temperature
      )));
    }
    let timeout_secs = parse_or(&get, ENV_TIMEOUT_SECS, default_gen.timeout.as_secs())?;
    if timeout_secs == 0 {
      return Err(OvertureError::Configuration(format!("{} must be positive", ENV_TIMEOUT_SECS)));
    }
    let retry = RetryPolicy {
      max_retries: parse_or(&get, ENV_MAX_RETRIES, default_gen.retry.max_retries)?,
      initial_backoff: Duration::from_millis(parse_or(
        &get,
        ENV_INITIAL_BACKOFF_MS,
        default_gen.retry.initial_backoff.as_millis() as u64,
      )?),
      ..default_gen.retry
    };

    let generator = GeneratorConfig {
      endpoint: get(ENV_ENDPOINT).unwrap_or(default_gen.endpoint),
      api_key: get(ENV_API_KEY),
      model: get(ENV_MODEL).unwrap_or(default_gen.model),
      temperature,
      system_prompt: default_gen.system_prompt,
      timeout: Duration::from_secs(timeout_secs),
      retry,
    };

    let config = Self {
      generator,
      checkpoint_dir: get(ENV_CHECKPOINT_DIR).map(PathBuf::from).unwrap_or(defaults.checkpoint_dir),
      output_dir: get(ENV_OUTPUT_DIR).map(PathBuf::from).unwrap_or(defaults.output_dir),
    };
    event!(
      Level::INFO,
      model = %config.generator.model,
      endpoint = %config.generator.endpoint,
      api_key_set = config.generator.api_key.is_some(),
      "Configuration loaded."
    );
    Ok(config)
  }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> OvertureResult<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match get(key) {
    None => Ok(default),
    Some(raw) => raw
      .parse::<T>()
      .map_err(|e| OvertureError::Configuration(format!("Invalid {} value '{}': {}", key, raw, e))),
  }
}
