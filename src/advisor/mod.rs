//! Prompt-driven advisors. Every kind of advice is the same round trip
//! (render a template, ask the oracle, trim the answer); only the template,
//! system prompt, token budget and history tag differ.

pub mod prompts;
pub mod statement;

use crate::llm::{CompletionRequest, LlmError, LlmManager};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

pub use statement::StatementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorKind {
    Optimize,
    Schema,
    Cost,
    CostSaver,
    Validate,
}

const COST_SYSTEM: &str = "You are a MariaDB execution plan and cost optimization expert.";

struct Profile {
    template: &'static str,
    system: &'static str,
    max_tokens: u32,
}

impl AdvisorKind {
    pub const ALL: [AdvisorKind; 5] = [
        AdvisorKind::Optimize,
        AdvisorKind::Schema,
        AdvisorKind::Cost,
        AdvisorKind::CostSaver,
        AdvisorKind::Validate,
    ];

    /// Value of the `type` field on history entries for this advisor.
    pub fn history_tag(self) -> &'static str {
        match self {
            AdvisorKind::Optimize => "optimize",
            AdvisorKind::Schema => "schema",
            AdvisorKind::Cost => "cost",
            AdvisorKind::CostSaver => "cost_saver",
            AdvisorKind::Validate => "validate_query",
        }
    }

    fn profile(self) -> Profile {
        match self {
            AdvisorKind::Optimize => Profile {
                template: prompts::OPTIMIZE,
                system: "You are a world-class MariaDB query optimizer.",
                max_tokens: 1000,
            },
            AdvisorKind::Schema => Profile {
                template: prompts::SCHEMA,
                system: "You are an expert in MariaDB schema design and optimization.",
                max_tokens: 500,
            },
            AdvisorKind::Cost => Profile {
                template: prompts::COST,
                system: COST_SYSTEM,
                max_tokens: 500,
            },
            AdvisorKind::CostSaver => Profile {
                template: prompts::COST_SAVER,
                system: COST_SYSTEM,
                max_tokens: 500,
            },
            AdvisorKind::Validate => Profile {
                template: prompts::VALIDATE,
                system: "You are a MariaDB SQL validation and security expert.",
                max_tokens: 500,
            },
        }
    }
}

impl fmt::Display for AdvisorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.history_tag())
    }
}

/// Outcome of one advisory call. Failures are data, tagged so callers never
/// have to guess from the text whether the oracle answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvisoryResult {
    Ok { text: String },
    Error { kind: String, message: String },
}

impl AdvisoryResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            AdvisoryResult::Ok { text } => Some(text),
            AdvisoryResult::Error { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AdvisoryResult::Ok { .. })
    }

    fn failure(kind: &str, message: impl Into<String>) -> Self {
        AdvisoryResult::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl From<LlmError> for AdvisoryResult {
    fn from(e: LlmError) -> Self {
        AdvisoryResult::failure(e.kind(), e.to_string())
    }
}

/// Inputs for the cost-saving report. Missing fields render as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSaverInputs {
    pub sql_query: String,
    pub slow_logs: String,
    pub storage_stats: String,
    pub query_history: String,
}

pub struct Advisor {
    llm: LlmManager,
    templates: Environment<'static>,
    temperature: f32,
}

impl Advisor {
    pub fn new(llm: LlmManager, temperature: f32) -> Result<Self, minijinja::Error> {
        let mut templates = Environment::new();
        for kind in AdvisorKind::ALL {
            templates.add_template(kind.history_tag(), kind.profile().template)?;
        }

        Ok(Self {
            llm,
            templates,
            temperature,
        })
    }

    pub async fn advise(&self, kind: AdvisorKind, sql: &str) -> AdvisoryResult {
        let statement_type = StatementType::detect(sql);
        let max_tokens = match kind {
            AdvisorKind::Optimize => statement_type.optimizer_max_tokens(),
            _ => kind.profile().max_tokens,
        };

        let ctx = context! {
            sql_query => sql,
            statement_type => statement_type.as_str(),
        };
        self.run(kind, ctx, max_tokens).await
    }

    pub async fn save_cost(&self, inputs: &CostSaverInputs) -> AdvisoryResult {
        let kind = AdvisorKind::CostSaver;
        self.run(kind, inputs, kind.profile().max_tokens).await
    }

    async fn run<S: Serialize>(&self, kind: AdvisorKind, ctx: S, max_tokens: u32) -> AdvisoryResult {
        let prompt = match self
            .templates
            .get_template(kind.history_tag())
            .and_then(|template| template.render(ctx))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                error!("Failed to render {} prompt: {}", kind, e);
                return AdvisoryResult::failure("prompt", e.to_string());
            }
        };

        let request = CompletionRequest {
            system: kind.profile().system.to_string(),
            prompt,
            max_tokens,
            temperature: self.temperature,
        };

        info!("Running {} advisor (max_tokens {})", kind, max_tokens);
        match self.llm.complete(&request).await {
            Ok(text) => AdvisoryResult::Ok {
                text: text.trim().to_string(),
            },
            Err(e) => {
                warn!("{} advisor failed: {}", kind, e);
                AdvisoryResult::from(e)
            }
        }
    }
}
