use crate::llm::{CompletionRequest, LlmError, LlmManager, TextCompleter};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Calls = Arc<Mutex<Vec<CompletionRequest>>>;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// Oracle stand-in that records every request and answers from a closure.
pub struct ScriptedCompleter {
    calls: Calls,
    respond: Responder,
}

impl ScriptedCompleter {
    pub fn with<F>(respond: F) -> (LlmManager, Calls)
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        let calls = Calls::default();
        let completer = ScriptedCompleter {
            calls: Arc::clone(&calls),
            respond: Box::new(respond),
        };
        (
            LlmManager::from_completer(Box::new(completer), Duration::from_secs(5)),
            calls,
        )
    }

    pub fn replying(text: &str) -> (LlmManager, Calls) {
        let text = text.to_string();
        Self::with(move |_| Ok(text.clone()))
    }

    pub fn failing<F>(make_error: F) -> (LlmManager, Calls)
    where
        F: Fn() -> LlmError + Send + Sync + 'static,
    {
        Self::with(move |_| Err(make_error()))
    }
}

#[async_trait]
impl TextCompleter for ScriptedCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(request.clone());
        (self.respond)(request)
    }
}
