use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

mod advisor;
mod analysis;
mod config;
mod history;
mod llm;
mod splitter;
#[cfg(test)]
mod test_support;
mod util;

use crate::advisor::{Advisor, AdvisorKind, CostSaverInputs};
use crate::analysis::{AnalysisRequest, Analyzer};
use crate::config::{AppConfig, CliArgs, Command};
use crate::history::{HistoryStore, ReadPolicy};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // A history log we cannot prepare means we are not ready to serve
    info!("Opening history log at {}", config.history.path);
    let policy = if config.history.lenient_reads {
        ReadPolicy::Lenient
    } else {
        ReadPolicy::Strict
    };
    let history = match HistoryStore::initialize(&config.history.path) {
        Ok(store) => store
            .with_read_policy(policy)
            .with_sync_writes(config.history.sync_writes),
        Err(e) => {
            error!("Failed to initialize history store: {}", e);
            return Err(e.into());
        }
    };
    let history = Arc::new(history);
    info!("History log ready at {}", history.path().display());

    match args.command {
        Command::History { limit } => {
            let store = Arc::clone(&history);
            let entries = tokio::task::spawn_blocking(move || store.get_recent(limit)).await??;
            print_json(&entries)
        }
        Command::Metrics => {
            let store = Arc::clone(&history);
            let metrics = tokio::task::spawn_blocking(move || store.metrics()).await??;
            print_json(&metrics)
        }
        command => {
            info!("Initializing LLM manager with backend: {}", config.llm.backend);
            let llm_manager = LlmManager::new(&config.llm)?;
            let advisor = Advisor::new(llm_manager, config.llm.temperature)?;
            let analyzer = Analyzer::new(advisor, history, config.history.audit_required);
            run_advisory(&analyzer, command).await
        }
    }
}

async fn run_advisory(
    analyzer: &Analyzer,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Analyze { input, schema_file } => {
            let schema_sql = match schema_file {
                Some(path) => Some(std::fs::read_to_string(path)?),
                None => None,
            };
            let envelope = analyzer
                .analyze(AnalysisRequest {
                    sql_query: input.read()?,
                    schema_sql,
                })
                .await?;
            print_json(&envelope)
        }
        Command::Optimize(input) => advise(analyzer, AdvisorKind::Optimize, &input.read()?).await,
        Command::Schema(input) => advise(analyzer, AdvisorKind::Schema, &input.read()?).await,
        Command::Cost(input) => advise(analyzer, AdvisorKind::Cost, &input.read()?).await,
        Command::Validate(input) => advise(analyzer, AdvisorKind::Validate, &input.read()?).await,
        Command::CostSaver {
            input,
            slow_logs,
            storage_stats,
            query_history,
        } => {
            let result = analyzer
                .save_cost(CostSaverInputs {
                    sql_query: input.read()?,
                    slow_logs,
                    storage_stats,
                    query_history,
                })
                .await?;
            print_json(&result)
        }
        Command::History { .. } | Command::Metrics => {
            unreachable!("read-side commands never build an analyzer")
        }
    }
}

async fn advise(
    analyzer: &Analyzer,
    kind: AdvisorKind,
    sql: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = analyzer.advise(kind, sql).await?;
    print_json(&result)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
