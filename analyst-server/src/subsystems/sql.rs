//! SQL step: the model writes a query, the store runs it as written.
//!
//! The query is not sandboxed or checked before execution. Every failure is
//! folded into the state; nothing propagates out of [`run_sql_query`].

use std::time::Instant;

use analyst_core::llm::strip_code_fence;
use analyst_core::{AnalysisState, ChatBackend};
use anyhow::{bail, Result};
use sqlx::SqlitePool;

pub const STEP: &str = "run_sql_query";

pub const SQL_PROMPT: &str = "You are an expert at querying a SQL database. \
Based on the user question and the database schema, write a SQL query to retrieve the \
requested information. Only respond with the SQL query, nothing else. \
Ensure the query is syntactically correct and optimized for SQLite. \
Use proper table and column names as specified in the schema.";

pub async fn run_sql_query(state: &mut AnalysisState, backend: &dyn ChatBackend, pool: &SqlitePool) {
    let started = Instant::now();

    let schema = state.schema.clone().unwrap_or_default();
    if state.question.trim().is_empty() || schema.trim().is_empty() {
        let msg = "Missing required state: question or schema";
        tracing::error!("{}", msg);
        state.sql_query = Some(format!("ERROR: {}", msg));
        state.record_error("sql", msg);
        state.record_step(STEP, started);
        return;
    }

    match generate_and_execute(state, &schema, backend, pool).await {
        Ok(rows) => tracing::info!(
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SQL operation completed"
        ),
        Err(e) => {
            let msg = format!("Error during SQL query execution: {}", e);
            tracing::error!(error = %e, query = ?state.sql_query, "SQL step failed");
            state.record_error("sql_execution", msg);
        }
    }
    state.record_step(STEP, started);
}

async fn generate_and_execute(
    state: &mut AnalysisState,
    schema: &str,
    backend: &dyn ChatBackend,
    pool: &SqlitePool,
) -> Result<usize> {
    let user = format!("Question: {}\n\nDatabase Schema: {}", state.question, schema);
    let reply = backend.complete(SQL_PROMPT, &user).await?;

    let query = strip_code_fence(&reply);
    if query.is_empty() {
        bail!("model returned an empty query");
    }
    tracing::debug!(query = %query, "Generated SQL");
    state.sql_query = Some(query.clone());

    let result = analyst_core::db::execute_query(pool, &query).await?;
    let rows = result.row_count();
    state.data = Some(result);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::testing::{sales_pool, ScriptedBackend};
    use serde_json::json;

    fn state_with_schema(question: &str) -> AnalysisState {
        let mut state = AnalysisState::new(question);
        state.schema = Some("Table: sales (1 rows)\n  - Region (TEXT)\n  - Sale (INTEGER)".into());
        state
    }

    #[tokio::test]
    async fn test_fenced_query_is_unwrapped_and_run() {
        let pool = sales_pool().await;
        let backend = ScriptedBackend::new(vec![Ok(
            "```sql\nSELECT Region, SUM(Sale) AS total FROM sales GROUP BY Region\n```",
        )]);
        let mut state = state_with_schema("Show total sales by region");
        run_sql_query(&mut state, &backend, &pool).await;

        assert!(!state.has_errors(), "{:?}", state.errors);
        assert_eq!(
            state.sql_query.as_deref(),
            Some("SELECT Region, SUM(Sale) AS total FROM sales GROUP BY Region")
        );
        let data = state.data.as_ref().unwrap();
        assert_eq!(data.rows, vec![vec![json!("North"), json!(100)]]);

        let calls = backend.calls.lock().unwrap();
        assert!(calls[0].1.contains("Database Schema: Table: sales"));
    }

    #[tokio::test]
    async fn test_execution_failure_is_recorded() {
        let pool = sales_pool().await;
        let backend = ScriptedBackend::new(vec![Ok("SELECT * FROM missing_table")]);
        let mut state = state_with_schema("q");
        run_sql_query(&mut state, &backend, &pool).await;

        assert!(state.errors["sql_execution"].starts_with("Error during SQL query execution"));
        assert_eq!(state.sql_query.as_deref(), Some("SELECT * FROM missing_table"));
        assert!(state.data.is_none());
        assert!(state.step_times.contains_key(STEP));
    }

    #[tokio::test]
    async fn test_model_failure_is_recorded() {
        let pool = sales_pool().await;
        let backend = ScriptedBackend::new(vec![Err("timeout")]);
        let mut state = state_with_schema("q");
        run_sql_query(&mut state, &backend, &pool).await;
        assert!(state.errors["sql_execution"].contains("timeout"));
        assert!(state.sql_query.is_none());
    }

    #[tokio::test]
    async fn test_missing_schema_short_circuits() {
        let pool = sales_pool().await;
        let backend = ScriptedBackend::new(vec![Ok("SELECT 1")]);
        let mut state = AnalysisState::new("q");
        run_sql_query(&mut state, &backend, &pool).await;

        assert_eq!(backend.call_count(), 0);
        assert!(state.sql_query.as_deref().unwrap().starts_with("ERROR: "));
        assert!(state.errors.contains_key("sql"));
    }
}
