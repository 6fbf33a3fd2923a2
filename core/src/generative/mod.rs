// overture/src/generative/mod.rs

//! Generative steps: prompt templating, the text generation service boundary,
//! and retry/timeout handling around each call.

pub mod client;
pub mod step;
pub mod template;

pub use client::{GenerationError, GeneratorConfig, HttpTextGenerator, RetryPolicy, TextGenerator};
pub use step::GenerativeStep;
pub use template::PromptTemplate;
