//! Turns a finished [`AnalysisState`] into what the UI and the CLI show.

use std::collections::BTreeMap;

use analyst_core::{AnalysisState, ChartSpec, QueryResult, Route};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Rows shown inline when the result is small.
const INLINE_ROWS: usize = 10;
/// Rows shown before the "... and K more rows" line.
const PREVIEW_ROWS: usize = 5;

/// URL prefix the HTTP server serves chart files under.
pub const CHART_URL_PREFIX: &str = "/charts/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub session_id: Option<Uuid>,
    pub question: String,
    pub answer: String,
    pub route: Route,
    pub sql_query: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub chart_url: Option<String>,
    pub chart_spec: Option<ChartSpec>,
    pub errors: BTreeMap<String, String>,
    pub warnings: BTreeMap<String, String>,
    pub step_times: BTreeMap<String, f64>,
    pub total_ms: f64,
}

impl AnalysisResponse {
    pub fn from_state(state: &AnalysisState) -> Self {
        let chart_url = chart_url(state);
        let (columns, rows) = match &state.data {
            Some(data) => (data.columns.clone(), data.rows.clone()),
            None => (Vec::new(), Vec::new()),
        };

        Self {
            session_id: state.session_id,
            question: state.question.clone(),
            answer: format_answer(state),
            route: state.route.unwrap_or_default(),
            sql_query: state.sql_query.clone(),
            row_count: rows.len(),
            columns,
            rows,
            chart_url,
            chart_spec: state.chart_spec.clone(),
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
            step_times: state.step_times.clone(),
            total_ms: state.total_ms(),
        }
    }
}

fn chart_url(state: &AnalysisState) -> Option<String> {
    let name = state.chart_path.as_ref()?.file_name()?.to_str()?;
    Some(format!("{}{}", CHART_URL_PREFIX, name))
}

pub fn format_answer(state: &AnalysisState) -> String {
    let mut parts = Vec::new();

    if state.has_errors() {
        let mut issues = String::from("Issues encountered:");
        for (key, message) in &state.errors {
            issues.push_str(&format!("\n- {}: {}", key, message));
        }
        parts.push(issues);
    }

    match state.route.unwrap_or_default() {
        Route::Sql => {
            if let Some(query) = state.sql_query.as_deref().filter(|q| !q.starts_with("ERROR:")) {
                parts.push(format!("```sql\n{}\n```", query));
            }
            match &state.data {
                Some(data) if !data.is_empty() => parts.push(format_rows(data)),
                Some(_) => parts.push("No data found".to_string()),
                None if !state.has_errors() => parts.push("No data found".to_string()),
                None => {}
            }
        }
        Route::Chart => {
            if state.chart_path.is_some() {
                let title = state
                    .chart_spec
                    .as_ref()
                    .map(ChartSpec::display_title)
                    .unwrap_or_else(|| "chart".to_string());
                parts.push(format!("Chart generated: {}", title));
            } else if !state.has_errors() {
                parts.push("No chart was generated".to_string());
            }
        }
    }

    parts.push(format!("Processing time: {:.2}s", state.total_ms() / 1000.0));
    parts.join("\n\n")
}

fn format_rows(data: &QueryResult) -> String {
    let count = data.row_count();
    let table = if count <= INLINE_ROWS {
        data.to_text(INLINE_ROWS)
    } else {
        let preview = QueryResult {
            columns: data.columns.clone(),
            rows: data.rows[..PREVIEW_ROWS].to_vec(),
        };
        format!(
            "{}\n... and {} more rows",
            preview.to_text(PREVIEW_ROWS),
            count - PREVIEW_ROWS
        )
    };
    format!("Found {} records\n{}", count, table)
}
