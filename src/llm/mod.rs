pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    AuthenticationError(String),
    ConfigError(String),
    Timeout(Duration),
}

impl LlmError {
    /// Stable, machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::ConnectionError(_) => "connection",
            LlmError::ResponseError(_) => "response",
            LlmError::AuthenticationError(_) => "authentication",
            LlmError::ConfigError(_) => "config",
            LlmError::Timeout(_) => "timeout",
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::AuthenticationError(msg) => write!(f, "LLM authentication error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::Timeout(after) => write!(f, "LLM call timed out after {:?}", after),
        }
    }
}

impl Error for LlmError {}

/// One prompt for the completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

pub struct LlmManager {
    completer: Box<dyn TextCompleter>,
    timeout: Duration,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let completer: Box<dyn TextCompleter> = match config.backend.as_str() {
            "anthropic" => Box::new(providers::anthropic::AnthropicProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self::from_completer(
            completer,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn from_completer(completer: Box<dyn TextCompleter>, timeout: Duration) -> Self {
        Self { completer, timeout }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(
            "Sending completion request ({} prompt chars, max_tokens {})",
            request.prompt.len(),
            request.max_tokens
        );

        match tokio::time::timeout(self.timeout, self.completer.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("LLM call exceeded {:?}", self.timeout);
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }
}
