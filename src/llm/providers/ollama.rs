use crate::config::LlmConfig;
use crate::llm::providers::status_error;
use crate::llm::{CompletionRequest, LlmError, TextCompleter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "http://localhost:11434/api/generate";

/// Local Ollama server, non-streaming `/api/generate`.
pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize, Debug)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
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
            model: config.model.clone(),
        })
    }

    fn generate_body<'a>(&'a self, request: &'a CompletionRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

/// Ollama reports some failures as an `error` field in place of text.
fn generated_text(body: &str) -> Result<String, LlmError> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::ResponseError(format!(
            "Failed to parse Ollama response: {} - Response was: {}",
            e, body
        ))
    })?;

    match parsed {
        GenerateResponse {
            error: Some(message),
            ..
        } => Err(LlmError::ResponseError(format!("Ollama error: {}", message))),
        GenerateResponse {
            response: Some(text),
            ..
        } => Ok(text),
        _ => Err(LlmError::ResponseError(format!(
            "Ollama response has no text - Response was: {}",
            body
        ))),
    }
}

#[async_trait]
impl TextCompleter for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(&self.generate_body(request))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            error!("Ollama API responded with status code: {}", status);
            return Err(status_error("Ollama", status, &body));
        }

        debug!("Raw response from Ollama: {}", body);
        generated_text(&body).inspect_err(|e| error!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_disables_streaming_and_caps_tokens() {
        let mut config = crate::config::AppConfig::default().llm;
        config.backend = "ollama".to_string();
        config.model = "sqlcoder".to_string();
        let provider = OllamaProvider::new(&config).expect("provider");
        assert_eq!(provider.api_url, DEFAULT_API_URL);

        let request = CompletionRequest {
            system: "You are an optimizer.".to_string(),
            prompt: "SELECT * FROM t".to_string(),
            max_tokens: 1500,
            temperature: 0.0,
        };
        let body = serde_json::to_value(provider.generate_body(&request)).expect("json body");
        assert_eq!(
            body,
            json!({
                "model": "sqlcoder",
                "system": "You are an optimizer.",
                "prompt": "SELECT * FROM t",
                "stream": false,
                "options": {"temperature": 0.0, "num_predict": 1500}
            })
        );
    }

    #[test]
    fn reads_generated_text() {
        let body = r#"{"model":"sqlcoder","response":"Optimized SQL Query:\nSELECT 1;","done":true}"#;
        assert_eq!(
            generated_text(body).expect("text"),
            "Optimized SQL Query:\nSELECT 1;"
        );
    }

    #[test]
    fn error_field_and_garbage_are_response_errors() {
        let err = generated_text(r#"{"error":"model 'x' not found"}"#)
            .err()
            .expect("error reply");
        assert_eq!(err.kind(), "response");
        assert!(err.to_string().contains("model 'x' not found"));

        let err = generated_text("not json").err().expect("garbage");
        assert_eq!(err.kind(), "response");
        assert!(err.to_string().contains("not json"));

        assert!(generated_text(r#"{"done":true}"#).is_err());
    }
}
