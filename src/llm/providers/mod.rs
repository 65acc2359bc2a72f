pub mod anthropic;
pub mod ollama;
pub mod remote;

use crate::llm::LlmError;
use reqwest::StatusCode;

/// Maps a non-success HTTP status to the matching error, keeping the body for
/// diagnostics.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> LlmError {
    let detail = if body.is_empty() {
        String::new()
    } else {
        format!(" - Response body: {}", body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthenticationError(
            format!("{} API rejected credentials ({}){}", provider, status, detail),
        ),
        _ => LlmError::ResponseError(format!(
            "{} API responded with status code: {}{}",
            provider, status, detail
        )),
    }
}
