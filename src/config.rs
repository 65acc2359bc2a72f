use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "anthropic", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub path: String,
    /// Skip malformed lines with a warning instead of failing the read.
    pub lenient_reads: bool,
    /// fsync after every append.
    pub sync_writes: bool,
    /// Fail the operation when its history entry cannot be written.
    pub audit_required: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub history: HistoryConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Location of the analysis history log
    #[arg(long, value_name = "FILE")]
    pub history_path: Option<String>,

    /// LLM backend to use
    #[arg(long)]
    pub backend: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Optimize a statement, then validate and cost the optimized version
    Analyze {
        #[command(flatten)]
        input: SqlInput,

        /// Schema DDL to review alongside the query
        #[arg(long, value_name = "FILE")]
        schema_file: Option<PathBuf>,
    },
    /// Rewrite a statement for performance
    Optimize(SqlInput),
    /// Review a schema definition
    Schema(SqlInput),
    /// Estimate the cost of a query
    Cost(SqlInput),
    /// Check a query for correctness and safety
    Validate(SqlInput),
    /// Suggest storage and execution cost reductions
    CostSaver {
        #[command(flatten)]
        input: SqlInput,

        #[arg(long, default_value = "")]
        slow_logs: String,

        #[arg(long, default_value = "")]
        storage_stats: String,

        #[arg(long, default_value = "")]
        query_history: String,
    },
    /// Show the most recent history entries
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show aggregate history statistics
    Metrics,
}

/// SQL text passed inline, from a file, or on stdin when neither is given.
#[derive(Args, Debug)]
pub struct SqlInput {
    #[arg(long, conflicts_with = "file")]
    pub sql: Option<String>,

    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

impl SqlInput {
    pub fn read(&self) -> std::io::Result<String> {
        if let Some(sql) = &self.sql {
            return Ok(sql.clone());
        }
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path);
        }
        std::io::read_to_string(std::io::stdin())
    }
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Self::defaults()?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/sql-advisor/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("SQL_ADVISOR")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Credentials and model names the original deployment kept in the environment
        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("CLAUDE_API_KEY")
                .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
                .ok()
                .filter(|key| !key.is_empty());
        }
        if let Ok(model) = std::env::var("CLAUDE_MODEL") {
            if !model.is_empty() {
                config.llm.model = model;
            }
        }

        // Override with command line args if provided
        if let Some(path) = &args.history_path {
            config.history.path = path.clone();
        }
        if let Some(backend) = &args.backend {
            config.llm.backend = backend.clone();
        }

        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = AppConfig::default();
        Config::builder()
            .set_default("llm.backend", defaults.llm.backend)?
            .set_default("llm.model", defaults.llm.model)?
            .set_default("llm.timeout_secs", defaults.llm.timeout_secs as i64)?
            .set_default("llm.temperature", defaults.llm.temperature as f64)?
            .set_default("history.path", defaults.history.path)?
            .set_default("history.lenient_reads", defaults.history.lenient_reads)?
            .set_default("history.sync_writes", defaults.history.sync_writes)?
            .set_default("history.audit_required", defaults.history.audit_required)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                backend: "anthropic".to_string(),
                model: "claude-3-haiku-20240307".to_string(),
                api_key: None,
                api_url: None,
                timeout_secs: 60,
                temperature: 0.0,
            },
            history: HistoryConfig {
                path: "data/history.jsonl".to_string(),
                lenient_reads: false,
                sync_writes: false,
                audit_required: false,
            },
        }
    }
}
