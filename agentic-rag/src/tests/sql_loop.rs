//! SQL retriever flows over an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::execution_loop::LoopSettings;
use crate::retrievers::{SqlOutcome, SqlRetriever};
use crate::stores::{ColumnInfo, DbStructure, QueryRows, TableSchema};
use crate::tests::support::{MemoryDatabases, ScriptedLlm};

const NARROW: &str = r#"{"tables": ["users"]}"#;

fn structure() -> DbStructure {
    let mut structure = DbStructure::default();
    structure.tables.insert(
        "users".to_string(),
        TableSchema {
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "INTEGER".to_string(),
                    nullable: false,
                },
                ColumnInfo {
                    name: "name".to_string(),
                    data_type: "TEXT".to_string(),
                    nullable: true,
                },
            ],
            primary_keys: vec!["id".to_string()],
            ..Default::default()
        },
    );
    structure
}

fn users() -> QueryRows {
    QueryRows {
        columns: vec!["id".to_string(), "name".to_string()],
        rows: vec![vec![json!(1), json!("Ada")]],
    }
}

fn settings(max_retries: usize) -> LoopSettings {
    LoopSettings {
        max_iterations: max_retries,
        llm_timeout: Duration::from_secs(5),
        execution_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_unsafe_sql_never_reaches_database() {
    let dbs = Arc::new(MemoryDatabases::new("crm", structure()).with_result(Ok(users())));
    let llm = Arc::new(ScriptedLlm::new([
        NARROW,
        r#"{"sql": "DROP TABLE users; SELECT * FROM users", "explanation": "reset"}"#,
        r#"{"sql": "SELECT * FROM users", "explanation": "all users"}"#,
    ]));
    let retriever = SqlRetriever::new(dbs.clone(), llm.clone(), settings(3), "unused");

    let run = retriever.generate("list users", "crm").await.unwrap();

    assert_eq!(dbs.executed(), vec!["SELECT * FROM users"]);
    assert_eq!(
        llm.calls()[2].last().unwrap().content,
        "This is not a safe sql, You only have permission to read data with SELECT."
    );
    assert_eq!(run.outcome.sql.as_deref(), Some("SELECT * FROM users"));
    assert_eq!(run.outcome.explanation, "all users");
    assert_eq!(run.outcome.data, Some(users()));
    assert_eq!(run.iterations, 2);
}

#[tokio::test]
async fn test_unsafe_sql_until_budget_runs_out() {
    let dbs = Arc::new(MemoryDatabases::new("crm", structure()));
    let llm = Arc::new(
        ScriptedLlm::new([NARROW])
            .with_fallback(r#"{"sql": "DELETE FROM users", "explanation": ""}"#),
    );
    let retriever = SqlRetriever::new(dbs.clone(), llm.clone(), settings(2), "unused");

    let run = retriever.generate("clean users", "crm").await.unwrap();

    assert!(dbs.executed().is_empty());
    assert_eq!(run.outcome.sql, None);
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn test_empty_result_with_single_retry_fails() {
    let empty = QueryRows {
        columns: vec!["id".to_string()],
        rows: Vec::new(),
    };
    let dbs = Arc::new(MemoryDatabases::new("crm", structure()).with_result(Ok(empty)));
    let llm = Arc::new(ScriptedLlm::new([
        NARROW,
        r#"{"sql": "SELECT id FROM users WHERE name = 'Nobody'", "explanation": ""}"#,
    ]));
    let retriever = SqlRetriever::new(dbs.clone(), llm.clone(), settings(1), "unused");

    let run = retriever.generate("find Nobody", "crm").await.unwrap();

    assert_eq!(
        run.outcome,
        SqlOutcome {
            sql: None,
            explanation: "Failed to extract required data after multiple attempts.".to_string(),
            data: None,
        }
    );
    assert_eq!(dbs.executed().len(), 1);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_empty_result_is_retried() {
    let dbs = Arc::new(
        MemoryDatabases::new("crm", structure())
            .with_result(Ok(QueryRows::default()))
            .with_result(Ok(users())),
    );
    let llm = Arc::new(ScriptedLlm::new([
        NARROW,
        r#"{"sql": "SELECT * FROM users WHERE name = 'ada'", "explanation": ""}"#,
        r#"{"sql": "SELECT * FROM users WHERE name LIKE 'ada'", "explanation": ""}"#,
    ]));
    let retriever = SqlRetriever::new(dbs, llm.clone(), settings(3), "unused");

    let run = retriever.generate("find Ada", "crm").await.unwrap();

    assert!(run.outcome.data.is_some());
    assert_eq!(llm.calls()[2].last().unwrap().content, "No data retrieved.");
}

#[tokio::test]
async fn test_model_declines() {
    let dbs = Arc::new(MemoryDatabases::new("crm", structure()));
    let llm = Arc::new(ScriptedLlm::new([
        NARROW,
        r#"{"sql": null, "explanation": "No table holds salaries"}"#,
    ]));
    let retriever = SqlRetriever::new(dbs.clone(), llm, settings(3), "unused");

    let run = retriever.generate("average salary", "crm").await.unwrap();

    assert_eq!(run.outcome.sql, None);
    assert_eq!(run.outcome.explanation, "No table holds salaries");
    assert_eq!(run.iterations, 1);
    assert!(dbs.executed().is_empty());
}

#[tokio::test]
async fn test_no_data_response_from_invoke() {
    let dir = tempfile::tempdir().unwrap();
    let dbs = Arc::new(MemoryDatabases::new("crm", structure()));
    let llm = Arc::new(ScriptedLlm::new([
        NARROW,
        r#"{"sql": null, "explanation": "nothing fits"}"#,
    ]));
    let retriever = SqlRetriever::new(dbs, llm, settings(3), dir.path());

    let args = json!({"task": "average salary", "db_name": "crm"});
    let output = retriever.invoke(args.as_object().unwrap()).await.unwrap();

    assert_eq!(output.content, "No data retrieved.");
    assert!(!dir.path().join("table_data.csv").exists());
}
