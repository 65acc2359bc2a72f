use crate::config::LlmConfig;
use crate::llm::providers::status_error;
use crate::llm::{CompletionRequest, LlmError, TextCompleter};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize, Debug)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError(
                "API key is required for the anthropic provider (set CLAUDE_API_KEY)".to_string(),
            )
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }
}

/// Pulls the completion text out of a Messages API body. Older gateways
/// answer with a top-level `completion` string instead.
fn extract_text(body: &Value) -> Option<String> {
    if let Some(text) = body
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    body.get("completion")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl TextCompleter for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        info!("Sending request to Anthropic with model: {}", self.model);

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            error!("Anthropic API responded with status code: {}", status);
            return Err(status_error("Anthropic", status, &response_text));
        }

        debug!("Raw response from Anthropic: {}", response_text);

        let parsed: Value = serde_json::from_str(&response_text).map_err(|e| {
            LlmError::ResponseError(format!(
                "Failed to parse Anthropic response: {} - Response was: {}",
                e, response_text
            ))
        })?;

        extract_text(&parsed).ok_or_else(|| {
            LlmError::ResponseError(format!(
                "No text content in Anthropic response: {}",
                response_text
            ))
        })
    }
}
