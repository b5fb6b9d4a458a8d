//! End-to-end pipeline tests against an in-memory store and a scripted model.

mod common;

use std::sync::Arc;

use analyst_core::config::ChartConfig;
use analyst_core::{ChartStore, Route};
use analyst_server::subsystems::respond::AnalysisResponse;
use analyst_server::subsystems::workflow::Workflow;
use common::{sales_pool, ScriptedBackend};
use serde_json::json;
use uuid::Uuid;

async fn workflow(replies: &[Result<&str, &str>]) -> (Workflow, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(replies));
    let dir = std::env::temp_dir().join(format!("analyst-wf-it-{}", Uuid::new_v4()));
    let wf = Workflow::new(
        backend.clone(),
        sales_pool().await,
        ChartStore::new(dir, 5),
        ChartConfig::default(),
    );
    (wf, backend)
}

#[tokio::test]
async fn test_total_sales_by_region() {
    let (wf, backend) = workflow(&[
        Ok("sql"),
        Ok("SELECT Region, SUM(Sale) AS total_sales FROM sales GROUP BY Region"),
    ])
    .await;

    let state = wf.run("Show total sales by region", None).await;

    assert_eq!(state.route, Some(Route::Sql));
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    let sql = state.sql_query.as_deref().unwrap();
    assert!(sql.contains("Region") && sql.contains("Sale") && sql.contains("sales"));

    let data = state.data.as_ref().unwrap();
    assert_eq!(data.columns, vec!["Region", "total_sales"]);
    assert_eq!(data.rows, vec![vec![json!("North"), json!(100)]]);

    // The SQL prompt carried the live schema.
    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Table: sales (1 rows)"));
    assert!(prompts[1].contains("  - Region (TEXT)"));

    let response = AnalysisResponse::from_state(&state);
    assert!(response.answer.contains("Found 1 records"));
    assert_eq!(response.row_count, 1);
}

#[tokio::test]
async fn test_sql_failure_is_contained() {
    let (wf, _) = workflow(&[Ok("sql"), Ok("SELEC broken FROM")]).await;
    let state = wf.run("Show total sales by region", None).await;

    assert_eq!(state.route, Some(Route::Sql));
    assert!(state.errors.contains_key("sql_execution"));
    assert_eq!(state.sql_query.as_deref(), Some("SELEC broken FROM"));

    let response = AnalysisResponse::from_state(&state);
    assert!(response.answer.starts_with("Issues encountered:"));
}

#[tokio::test]
async fn test_bad_router_reply_defaults_to_sql() {
    let (wf, _) = workflow(&[Ok("visualization!"), Ok("SELECT COUNT(*) FROM sales")]).await;
    let state = wf.run("How many rows?", None).await;

    assert_eq!(state.route, Some(Route::Sql));
    assert!(state.warnings.contains_key("routing"));
    assert!(!state.errors.contains_key("routing"));
    assert_eq!(state.data.as_ref().unwrap().row_count(), 1);
}

#[tokio::test]
async fn test_chart_path_renders_svg() {
    let (wf, _) = workflow(&[
        Ok("chart"),
        Ok("```json\n{\"chart_type\": \"pie\", \"table\": \"sales\", \"x\": \"Region\", \"y\": \"Sale\", \"aggregation\": \"sum\", \"title\": \"Share by region\"}\n```"),
    ])
    .await;
    let state = wf.run("Plot a pie of sales by region", None).await;

    assert_eq!(state.route, Some(Route::Chart));
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
    let path = state.chart_path.clone().unwrap();
    assert!(path.extension().is_some_and(|e| e == "svg"));

    let response = AnalysisResponse::from_state(&state);
    assert!(response.chart_url.unwrap().starts_with("/charts/chart_"));
    assert!(response.answer.contains("Chart generated: Share by region"));

    tokio::fs::remove_dir_all(wf.store().dir()).await.unwrap();
}

#[tokio::test]
async fn test_chart_failure_is_contained() {
    let (wf, _) = workflow(&[Ok("chart"), Ok("plt.bar(df['Region'], df['Sale'])")]).await;
    let state = wf.run("Draw a bar chart of sales", None).await;

    assert_eq!(state.route, Some(Route::Chart));
    assert!(state.errors.contains_key("chart_generation"));
    assert!(state.chart_path.is_none());
    assert!(state.data.is_none());
}
