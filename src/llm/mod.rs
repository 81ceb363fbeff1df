pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),

    #[error("LLM authentication error: {0}")]
    AuthError(String),

    #[error("LLM response error: {0}")]
    ResponseError(String),

    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Turns a question into one SQL statement, optionally guided by a schema description.
    async fn generate_sql(&self, question: &str, schema: Option<&str>) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn SqlGenerator>,
    model: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn SqlGenerator> = match config.backend.as_str() {
            "groq" | "openai" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        info!("Using {} backend with model {}", config.backend, config.model);
        Ok(Self {
            generator,
            model: config.model.clone(),
        })
    }

    /// Wraps an already constructed generator.
    #[cfg(test)]
    pub fn with_generator(generator: Box<dyn SqlGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_sql(&self, question: &str, schema: Option<&str>) -> Result<String, LlmError> {
        self.generator.generate_sql(question, schema).await
    }
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^```(?:sqlite|sql)?[ \t]*\r?\n?(.*?)\s*```$").expect("fenced block pattern is valid")
});

/// Trims the model's answer and unwraps it when the whole answer is a fenced code block.
///
/// Quotes, newlines and anything else inside are left as the model wrote them.
pub fn clean_response(content: &str) -> String {
    let trimmed = content.trim();
    match FENCED_BLOCK.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}
