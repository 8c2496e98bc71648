//! SQL database retriever.
//!
//! Two phases against one linked database:
//! 1. Narrowing: one model call picks the tables the task needs
//! 2. Generation: a self-correcting loop writes a read-only query, checks it
//!    with `sql_safety`, runs it and retries on errors or empty results
//!
//! Unsafe statements never reach the database.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{LlmError, ToolError};
use crate::execution_loop::{ExecutionLoop, LoopSettings, LoopStatus, LoopStrategy, Step};
use crate::llm::LlmClient;
use crate::prompts::{SQL_WRITING_PROMPT, TABLE_SELECTION_PROMPT};
use crate::protocol::{ArtifactSet, ExecutionObservation, Message, TokenUsage};
use crate::sql_safety::is_safe_sql;
use crate::stores::{DbStructure, ExternalDatabases, QueryRows};
use crate::tool_parsing::{extract_json_object, string_list};
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "sql_database_retriever";

pub const DESCRIPTION: &str = "This retriever requires a name of the linked database source and a query asking to extract particular data, it then retrieves data in table format and save in `retrieved_data/table_data.csv`.";

pub const ARGUMENTS: [ArgumentSpec; 2] = [
    ArgumentSpec::required("task", ArgType::String, "What data to extract from the database"),
    ArgumentSpec::required("db_name", ArgType::String, "Name of the linked database source"),
];

const UNSAFE_SQL: &str =
    "This is not a safe sql, You only have permission to read data with SELECT.";
const NO_DATA: &str = "No data retrieved.";
const EXHAUSTED: &str = "Failed to extract required data after multiple attempts.";
const FORMAT_REMINDER: &str = "Could not find a JSON object in your response. Respond in json format as {\"sql\": \"SELECT ...\", \"explanation\": \"...\"}, or set \"sql\" to null if the task cannot be solved with the given tables.";

/// Result of the generation loop. `sql` and `data` are both `None` when the
/// model declined or the budget ran out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlOutcome {
    pub sql: Option<String>,
    pub explanation: String,
    pub data: Option<QueryRows>,
}

impl SqlOutcome {
    fn failed(explanation: impl Into<String>) -> Self {
        Self {
            sql: None,
            explanation: explanation.into(),
            data: None,
        }
    }
}

/// Outcome plus bookkeeping for one retriever call.
#[derive(Debug, Clone)]
pub struct SqlRun {
    pub outcome: SqlOutcome,
    /// Tables embedded in the generation prompt
    pub tables: Vec<String>,
    pub iterations: usize,
    pub usage: TokenUsage,
}

pub struct SqlRetriever {
    dbs: Arc<dyn ExternalDatabases>,
    llm: Arc<dyn LlmClient>,
    settings: LoopSettings,
    retrieved_dir: PathBuf,
}

impl SqlRetriever {
    /// `settings.max_iterations` bounds the generation attempts.
    pub fn new(
        dbs: Arc<dyn ExternalDatabases>,
        llm: Arc<dyn LlmClient>,
        settings: LoopSettings,
        retrieved_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dbs,
            llm,
            settings,
            retrieved_dir: retrieved_dir.into(),
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let task = str_arg(args, "task")?;
        let db_name = str_arg(args, "db_name")?;

        let run = self.generate(task, db_name).await?;
        let rows = match &run.outcome.data {
            Some(rows) if !rows.is_empty() => rows,
            _ => {
                info!(
                    "[SqlRetriever] No data for `{}`: {}",
                    db_name, run.outcome.explanation
                );
                return Ok(ToolOutput::text(NO_DATA).with_usage(run.usage));
            }
        };

        tokio::fs::create_dir_all(&self.retrieved_dir).await?;
        let path = self.retrieved_dir.join("table_data.csv");
        let mut buffer = Vec::new();
        rows.write_csv(&mut buffer)?;
        tokio::fs::write(&path, buffer).await?;

        info!(
            "[SqlRetriever] {} rows from `{}` saved to {}",
            rows.rows.len(),
            db_name,
            path.display()
        );
        Ok(ToolOutput::text(format!(
            "Retrieved data has been saved to `{}`",
            path.display()
        ))
        .with_usage(run.usage))
    }

    /// Narrow the schema, then run the generation loop. Only an unknown
    /// database or a failed narrowing call is an error.
    pub async fn generate(&self, task: &str, db_name: &str) -> Result<SqlRun, ToolError> {
        let structure = self.dbs.structure(db_name).await?;
        let mut usage = TokenUsage::default();

        let narrowed = self.narrow(task, &structure, &mut usage).await?;
        let tables: Vec<String> = narrowed.table_names().iter().map(|s| s.to_string()).collect();
        debug!("[SqlRetriever] Generating over tables {:?}", tables);

        let conversation = vec![
            Message::system(SQL_WRITING_PROMPT),
            Message::user(format!(
                "Task: {}\n Table and Fields Data: {}",
                task,
                narrowed.table_and_fields_json()
            )),
        ];
        let mut strategy = SqlLoopStrategy {
            dbs: self.dbs.as_ref(),
            db_name,
            last_rows: None,
        };
        let outcome = ExecutionLoop::new(self.llm.as_ref(), self.settings.clone())
            .run(conversation, &mut strategy)
            .await;
        usage.add(&outcome.usage);

        let result = match outcome.status {
            LoopStatus::Completed(result) => result,
            LoopStatus::Exhausted(message) | LoopStatus::Aborted(message) => {
                SqlOutcome::failed(message)
            }
        };
        Ok(SqlRun {
            outcome: result,
            tables,
            iterations: outcome.iterations_used,
            usage,
        })
    }

    async fn narrow(
        &self,
        task: &str,
        structure: &DbStructure,
        usage: &mut TokenUsage,
    ) -> Result<DbStructure, ToolError> {
        let messages = [
            Message::system(TABLE_SELECTION_PROMPT),
            Message::user(format!(
                "Task: {}\n Tables: [{}]",
                task,
                structure.table_names().join(", ")
            )),
        ];
        let response = timeout(self.settings.llm_timeout, self.llm.invoke(&messages))
            .await
            .map_err(|_| LlmError::Timeout(self.settings.llm_timeout))??;
        usage.add(&response.usage);

        let selected = string_list(&extract_json_object(&response.content), "tables");
        let narrowed = structure.subset(&selected);
        if narrowed.is_empty() {
            warn!(
                "[SqlRetriever] Narrowing selected no known tables ({:?}); using full schema",
                selected
            );
            return Ok(structure.clone());
        }
        Ok(narrowed)
    }
}

// ========== Generation loop ==========

enum SqlCandidate {
    Query { sql: String, explanation: String },
    Declined(String),
}

struct SqlLoopStrategy<'a> {
    dbs: &'a dyn ExternalDatabases,
    db_name: &'a str,
    last_rows: Option<QueryRows>,
}

#[async_trait]
impl LoopStrategy for SqlLoopStrategy<'_> {
    type Candidate = SqlCandidate;
    type Output = SqlOutcome;

    fn name(&self) -> &'static str {
        "SqlRetriever"
    }

    fn extract(&mut self, raw: &str) -> Result<SqlCandidate, String> {
        let obj = extract_json_object(raw);
        let explanation = obj
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match obj.get("sql") {
            Some(Value::String(sql)) if is_safe_sql(sql) => Ok(SqlCandidate::Query {
                sql: sql.clone(),
                explanation,
            }),
            Some(Value::String(sql)) => {
                warn!("[SqlRetriever] Rejected unsafe SQL: {}", sql);
                Err(UNSAFE_SQL.to_string())
            }
            Some(Value::Null) => Ok(SqlCandidate::Declined(explanation)),
            _ => Err(FORMAT_REMINDER.to_string()),
        }
    }

    async fn execute(&mut self, candidate: &SqlCandidate) -> ExecutionObservation {
        let SqlCandidate::Query { sql, .. } = candidate else {
            return ExecutionObservation::output("");
        };
        match self.dbs.run_read_query(self.db_name, sql).await {
            Ok(rows) => {
                let summary = format!("{} rows", rows.rows.len());
                self.last_rows = Some(rows);
                ExecutionObservation::output(summary)
            }
            Err(e) => {
                self.last_rows = None;
                ExecutionObservation::error(format!("ERROR OCCURRED WHILE EXECUTING SQL: {}", e))
            }
        }
    }

    fn judge(
        &mut self,
        _raw: &str,
        candidate: &SqlCandidate,
        observation: &ExecutionObservation,
        _artifacts: &ArtifactSet,
    ) -> Step<SqlOutcome> {
        let (sql, explanation) = match candidate {
            SqlCandidate::Declined(explanation) => {
                return Step::Done(SqlOutcome::failed(explanation.clone()))
            }
            SqlCandidate::Query { sql, explanation } => (sql, explanation),
        };

        if let Some(error) = observation.error_text() {
            return Step::Retry {
                feedback: error.to_string(),
            };
        }
        match self.last_rows.take() {
            Some(rows) if !rows.is_empty() => Step::Done(SqlOutcome {
                sql: Some(sql.clone()),
                explanation: explanation.clone(),
                data: Some(rows),
            }),
            _ => Step::Retry {
                feedback: NO_DATA.to_string(),
            },
        }
    }

    fn exhausted_message(&self, _max_iterations: usize) -> String {
        EXHAUSTED.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{ColumnInfo, TableSchema};
    use crate::tests::support::{MemoryDatabases, ScriptedLlm};
    use serde_json::json;

    fn structure() -> DbStructure {
        let mut structure = DbStructure::default();
        for (table, column) in [("customers", "name"), ("orders", "total")] {
            structure.tables.insert(
                table.to_string(),
                TableSchema {
                    columns: vec![ColumnInfo {
                        name: column.to_string(),
                        data_type: "TEXT".to_string(),
                        nullable: true,
                    }],
                    ..Default::default()
                },
            );
        }
        structure
    }

    fn rows() -> QueryRows {
        QueryRows {
            columns: vec!["total".to_string()],
            rows: vec![vec![json!(12.5)], vec![json!(3)]],
        }
    }

    #[tokio::test]
    async fn test_narrowing_embeds_only_selected_tables() {
        let dbs = Arc::new(MemoryDatabases::new("shop", structure()).with_result(Ok(rows())));
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tables": ["orders"]}"#,
            r#"{"sql": "SELECT total FROM orders", "explanation": "all totals"}"#,
        ]));
        let retriever = SqlRetriever::new(dbs, llm.clone(), LoopSettings::default(), "unused");

        let run = retriever.generate("order totals", "shop").await.unwrap();
        assert_eq!(run.tables, vec!["orders"]);
        assert_eq!(run.outcome.sql.as_deref(), Some("SELECT total FROM orders"));
        assert_eq!(run.outcome.data, Some(rows()));

        let calls = llm.calls();
        assert_eq!(
            calls[0][1].content,
            "Task: order totals\n Tables: [customers, orders]"
        );
        let prompt = &calls[1][1].content;
        assert!(prompt.starts_with("Task: order totals\n Table and Fields Data: "));
        assert!(prompt.contains("\"table_name\": \"orders\""));
        assert!(!prompt.contains("customers"));
    }

    #[tokio::test]
    async fn test_unknown_narrowed_tables_fall_back_to_full_schema() {
        let dbs = Arc::new(MemoryDatabases::new("shop", structure()).with_result(Ok(rows())));
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tables": ["invoices"]}"#,
            r#"{"sql": "SELECT total FROM orders", "explanation": ""}"#,
        ]));
        let retriever = SqlRetriever::new(dbs, llm, LoopSettings::default(), "unused");

        let run = retriever.generate("totals", "shop").await.unwrap();
        assert_eq!(run.tables, vec!["customers", "orders"]);
    }

    #[tokio::test]
    async fn test_database_error_is_fed_back_verbatim() {
        let dbs = Arc::new(
            MemoryDatabases::new("shop", structure())
                .with_result(Err("no such column: totl".to_string()))
                .with_result(Ok(rows())),
        );
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tables": ["orders"]}"#,
            r#"{"sql": "SELECT totl FROM orders", "explanation": ""}"#,
            r#"{"sql": "SELECT total FROM orders", "explanation": ""}"#,
        ]));
        let retriever = SqlRetriever::new(dbs.clone(), llm.clone(), LoopSettings::default(), "unused");

        let run = retriever.generate("totals", "shop").await.unwrap();
        assert_eq!(run.iterations, 2);
        assert_eq!(dbs.executed().len(), 2);
        let calls = llm.calls();
        let feedback = &calls[2].last().unwrap().content;
        assert_eq!(
            feedback,
            "ERROR OCCURRED WHILE EXECUTING SQL: database error: no such column: totl"
        );
    }

    #[tokio::test]
    async fn test_missing_sql_key_is_format_reminder() {
        let dbs = Arc::new(MemoryDatabases::new("shop", structure()).with_result(Ok(rows())));
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tables": ["orders"]}"#,
            "I think you want the totals.",
            r#"{"sql": "SELECT total FROM orders", "explanation": ""}"#,
        ]));
        let retriever = SqlRetriever::new(dbs, llm.clone(), LoopSettings::default(), "unused");

        let run = retriever.generate("totals", "shop").await.unwrap();
        assert!(run.outcome.data.is_some());
        assert_eq!(llm.calls()[2].last().unwrap().content, FORMAT_REMINDER);
    }

    #[tokio::test]
    async fn test_invoke_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = Arc::new(MemoryDatabases::new("shop", structure()).with_result(Ok(rows())));
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tables": ["orders"]}"#,
            r#"{"sql": "SELECT total FROM orders", "explanation": ""}"#,
        ]));
        let retriever = SqlRetriever::new(dbs, llm, LoopSettings::default(), dir.path());

        let args = json!({"task": "totals", "db_name": "shop"});
        let output = retriever.invoke(args.as_object().unwrap()).await.unwrap();

        let path = dir.path().join("table_data.csv");
        assert_eq!(
            output.content,
            format!("Retrieved data has been saved to `{}`", path.display())
        );
        let csv = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(csv, "total\n12.5\n3\n");
    }

    #[tokio::test]
    async fn test_unknown_database_is_tool_error() {
        let dbs = Arc::new(MemoryDatabases::new("shop", structure()));
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let retriever = SqlRetriever::new(dbs, llm.clone(), LoopSettings::default(), "unused");

        let err = retriever.generate("totals", "warehouse").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown database: `warehouse`");
        assert_eq!(llm.call_count(), 0);
    }
}
