use crate::advisor::{Advisor, AdvisorKind, AdvisoryResult, CostSaverInputs};
use crate::history::{HistoryError, HistoryStore};
use crate::splitter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub sql_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_sql: Option<String>,
}

/// Everything one analysis produced, as returned to the caller and stored in
/// the history.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEnvelope {
    pub original_query: String,
    pub optimized_query: String,
    pub optimization_rationale: String,
    pub optimizer: AdvisoryResult,
    pub validation_report: AdvisoryResult,
    pub cost_estimation: AdvisoryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_suggestions: Option<AdvisoryResult>,
}

#[derive(Serialize)]
struct HistoryRecord<'a, Req, Resp> {
    #[serde(rename = "type")]
    kind: &'a str,
    request: &'a Req,
    response: &'a Resp,
}

pub struct Analyzer {
    advisor: Advisor,
    history: Arc<HistoryStore>,
    audit_required: bool,
}

impl Analyzer {
    pub fn new(advisor: Advisor, history: Arc<HistoryStore>, audit_required: bool) -> Self {
        Self {
            advisor,
            history,
            audit_required,
        }
    }

    /// Optimizes the statement, then validates and costs the optimized form
    /// (and reviews the schema, when given) concurrently.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisEnvelope, HistoryError> {
        info!("Analyzing statement ({} chars)", request.sql_query.len());

        let optimizer = self
            .advisor
            .advise(AdvisorKind::Optimize, &request.sql_query)
            .await;
        let split = splitter::split(optimizer.text());

        // Without a usable rewrite, downstream advice is about the original.
        let target = if split.primary.is_empty() {
            request.sql_query.as_str()
        } else {
            split.primary.as_str()
        };

        let schema_review = async {
            match request.schema_sql.as_deref() {
                Some(schema) if !schema.trim().is_empty() => {
                    Some(self.advisor.advise(AdvisorKind::Schema, schema).await)
                }
                _ => None,
            }
        };

        let (validation_report, cost_estimation, schema_suggestions) = tokio::join!(
            self.advisor.advise(AdvisorKind::Validate, target),
            self.advisor.advise(AdvisorKind::Cost, target),
            schema_review,
        );

        let envelope = AnalysisEnvelope {
            original_query: request.sql_query.clone(),
            optimized_query: split.primary,
            optimization_rationale: split.rationale,
            optimizer,
            validation_report,
            cost_estimation,
            schema_suggestions,
        };

        info!(
            "Analysis finished (optimizer ok: {}, rewrite found: {})",
            envelope.optimizer.is_ok(),
            !envelope.optimized_query.is_empty()
        );

        self.record("analysis", &request, &envelope).await?;
        Ok(envelope)
    }

    pub async fn advise(&self, kind: AdvisorKind, sql: &str) -> Result<AdvisoryResult, HistoryError> {
        let result = self.advisor.advise(kind, sql).await;
        self.record(kind.history_tag(), &json!({ "sql_query": sql }), &result)
            .await?;
        Ok(result)
    }

    pub async fn save_cost(&self, inputs: CostSaverInputs) -> Result<AdvisoryResult, HistoryError> {
        let result = self.advisor.save_cost(&inputs).await;
        self.record(AdvisorKind::CostSaver.history_tag(), &inputs, &result)
            .await?;
        Ok(result)
    }

    /// Appends the request/response pair. Failures are logged and swallowed
    /// unless the deployment requires a complete audit trail.
    async fn record<Req, Resp>(&self, kind: &str, request: &Req, response: &Resp) -> Result<(), HistoryError>
    where
        Req: Serialize,
        Resp: Serialize,
    {
        let outcome = match serde_json::to_value(HistoryRecord {
            kind,
            request,
            response,
        }) {
            Ok(record) => {
                let store = Arc::clone(&self.history);
                tokio::task::spawn_blocking(move || store.append(&record))
                    .await
                    .map_err(|e| HistoryError::StorageWrite(format!("history task failed: {}", e)))
                    .and_then(|written| written)
            }
            Err(e) => Err(HistoryError::StorageWrite(format!(
                "failed to serialize {} record: {}",
                kind, e
            ))),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if self.audit_required => {
                error!("Failed to record {} history entry: {}", kind, e);
                Err(e)
            }
            Err(e) => {
                warn!("Failed to record {} history entry, continuing: {}", kind, e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LlmError};
    use crate::test_support::{Calls, ScriptedCompleter};

    const OPTIMIZER_REPLY: &str =
        "Optimized SQL Query:\nSELECT id FROM orders;\n\nRationale:\n- narrowed columns";

    fn reply_by_role(request: &CompletionRequest) -> Result<String, LlmError> {
        let system = request.system.as_str();
        if system.contains("query optimizer") {
            Ok(OPTIMIZER_REPLY.to_string())
        } else if system.contains("validation") {
            Ok("- Syntax Compliance: pass".to_string())
        } else if system.contains("schema design") {
            Ok("- Indexing: add idx_orders_id".to_string())
        } else {
            Ok("- Full scan avoided".to_string())
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        store: Arc<HistoryStore>,
        analyzer: Analyzer,
        calls: Calls,
    }

    fn analyzer_with<F>(respond: F, audit_required: bool) -> Harness
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            HistoryStore::initialize(dir.path().join("history.jsonl")).expect("init"),
        );
        let (llm, calls) = ScriptedCompleter::with(respond);
        let advisor = Advisor::new(llm, 0.0).expect("advisor");
        let analyzer = Analyzer::new(advisor, Arc::clone(&store), audit_required);
        Harness {
            dir,
            store,
            analyzer,
            calls,
        }
    }

    fn break_history(harness: &Harness) {
        let path = harness.dir.path().join("history.jsonl");
        std::fs::remove_file(&path).expect("remove log");
        std::fs::create_dir(&path).expect("directory in place of log");
    }

    #[tokio::test]
    async fn analyze_splits_optimizer_output_and_records_envelope() {
        let Harness { dir: _dir, store, analyzer, calls } = analyzer_with(reply_by_role, false);

        let envelope = analyzer
            .analyze(AnalysisRequest {
                sql_query: "SELECT * FROM orders;".to_string(),
                schema_sql: Some("CREATE TABLE orders (id INT);".to_string()),
            })
            .await
            .expect("analyze");

        assert_eq!(envelope.original_query, "SELECT * FROM orders;");
        assert_eq!(envelope.optimized_query, "SELECT id FROM orders;");
        assert_eq!(envelope.optimization_rationale, "- narrowed columns");
        assert_eq!(envelope.validation_report.text(), Some("- Syntax Compliance: pass"));
        assert_eq!(envelope.cost_estimation.text(), Some("- Full scan avoided"));
        assert_eq!(
            envelope.schema_suggestions.as_ref().and_then(|s| s.text()),
            Some("- Indexing: add idx_orders_id")
        );

        // validator and cost advisor see the rewrite, not the original
        let calls = calls.lock().expect("calls").clone();
        assert_eq!(calls.len(), 4);
        let downstream: Vec<_> = calls
            .iter()
            .filter(|c| c.system.contains("validation") || c.system.contains("cost"))
            .collect();
        assert_eq!(downstream.len(), 2);
        assert!(downstream
            .iter()
            .all(|c| c.prompt.contains("SELECT id FROM orders;") && !c.prompt.contains("SELECT *")));

        let history = store.get_recent(10).expect("recent");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind(), Some("analysis"));
        let response = history[0].get("response").expect("response");
        assert_eq!(response["optimized_query"], "SELECT id FROM orders;");
        assert_eq!(response["validation_report"]["status"], "ok");
        assert_eq!(
            history[0].get("request").expect("request")["sql_query"],
            "SELECT * FROM orders;"
        );
    }

    #[tokio::test]
    async fn failed_optimizer_falls_back_to_original_query() {
        let Harness { dir: _dir, analyzer, calls, .. } = analyzer_with(
            |request| {
                if request.system.contains("query optimizer") {
                    Err(LlmError::ConnectionError("refused".to_string()))
                } else {
                    Ok("ok".to_string())
                }
            },
            false,
        );

        let envelope = analyzer
            .analyze(AnalysisRequest {
                sql_query: "UPDATE t SET a = 1".to_string(),
                schema_sql: None,
            })
            .await
            .expect("analyze");

        assert_eq!(envelope.optimized_query, "");
        assert_eq!(envelope.optimization_rationale, "");
        assert!(matches!(
            envelope.optimizer,
            AdvisoryResult::Error { ref kind, .. } if kind == "connection"
        ));
        assert!(envelope.schema_suggestions.is_none());
        assert!(envelope.validation_report.is_ok());

        let calls = calls.lock().expect("calls").clone();
        assert_eq!(calls.len(), 3);
        assert!(calls[1..].iter().all(|c| c.prompt.contains("UPDATE t SET a = 1")));
    }

    #[tokio::test]
    async fn history_failure_does_not_block_the_result() {
        let harness = analyzer_with(reply_by_role, false);
        break_history(&harness);
        let analyzer = &harness.analyzer;

        let result = analyzer
            .advise(AdvisorKind::Cost, "SELECT 1")
            .await
            .expect("write failure is logged, not returned");
        assert_eq!(result.text(), Some("- Full scan avoided"));
    }

    #[tokio::test]
    async fn history_failure_is_returned_when_audit_is_required() {
        let harness = analyzer_with(reply_by_role, true);
        break_history(&harness);
        let analyzer = &harness.analyzer;

        let err = analyzer
            .analyze(AnalysisRequest {
                sql_query: "SELECT 1".to_string(),
                schema_sql: None,
            })
            .await
            .err()
            .expect("audit failure");
        assert!(matches!(err, HistoryError::StorageWrite(_)));
    }

    #[tokio::test]
    async fn single_advisors_are_tagged_in_history() {
        let Harness { dir: _dir, store, analyzer, .. } = analyzer_with(reply_by_role, false);

        analyzer
            .advise(AdvisorKind::Validate, "DELETE FROM t")
            .await
            .expect("validate");
        analyzer
            .save_cost(CostSaverInputs {
                sql_query: "SELECT 1".to_string(),
                slow_logs: "slow".to_string(),
                ..CostSaverInputs::default()
            })
            .await
            .expect("cost saver");

        let history = store.get_recent(5).expect("recent");
        let kinds: Vec<_> = history.iter().filter_map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["validate_query", "cost_saver"]);
        assert_eq!(history[0].get("request").expect("request")["sql_query"], "DELETE FROM t");
        assert_eq!(history[1].get("request").expect("request")["slow_logs"], "slow");

        let metrics = store.metrics().expect("metrics");
        assert_eq!(metrics.total_entries, 2);
        assert_eq!(metrics.first_run_at, Some(history[0].timestamp));
        assert_eq!(metrics.last_run_at, Some(history[1].timestamp));
    }
}
