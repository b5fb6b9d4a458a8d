//! Per-request state threaded through the pipeline steps.
//!
//! Every field except `question` starts empty and is filled in by the step
//! that owns it. Steps never remove what an earlier step wrote, and nothing
//! touches `question` after construction.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chart::ChartSpec;
use crate::models::{QueryResult, Route};

/// Key under which the running total is kept in `step_times`.
pub const TOTAL_ELAPSED: &str = "total_elapsed";

const LARGE_DATA_CHARS: usize = 1000;
const LARGE_SCHEMA_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub question: String,
    pub session_id: Option<Uuid>,
    pub schema: Option<String>,
    pub route: Option<Route>,
    pub sql_query: Option<String>,
    pub data: Option<QueryResult>,
    pub chart_spec: Option<ChartSpec>,
    pub chart_path: Option<PathBuf>,
    /// Step name -> milliseconds.
    #[serde(default)]
    pub step_times: BTreeMap<String, f64>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: BTreeMap<String, String>,
    #[serde(skip, default = "Instant::now")]
    started: Instant,
}

/// Compact view of a state for logs.
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub has_question: bool,
    pub has_schema: bool,
    pub has_sql_query: bool,
    pub has_data: bool,
    pub has_chart: bool,
    pub route: Option<Route>,
    pub error_count: usize,
    pub warning_count: usize,
    pub timing: BTreeMap<String, f64>,
}

impl AnalysisState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
            schema: None,
            route: None,
            sql_query: None,
            data: None,
            chart_spec: None,
            chart_path: None,
            step_times: BTreeMap::new(),
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
            started: Instant::now(),
        }
    }

    pub fn with_session(mut self, session_id: Option<Uuid>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Record how long a step took and refresh the running total.
    pub fn record_step(&mut self, step: &str, step_started: Instant) {
        self.step_times
            .insert(step.to_string(), millis(step_started.elapsed()));
        self.step_times
            .insert(TOTAL_ELAPSED.to_string(), millis(self.started.elapsed()));
    }

    pub fn record_error(&mut self, key: &str, message: impl Into<String>) {
        self.errors.insert(key.to_string(), message.into());
    }

    pub fn record_warning(&mut self, key: &str, message: impl Into<String>) {
        self.warnings.insert(key.to_string(), message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total_ms(&self) -> f64 {
        self.step_times
            .get(TOTAL_ELAPSED)
            .copied()
            .unwrap_or_else(|| millis(self.started.elapsed()))
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            has_question: !self.question.is_empty(),
            has_schema: self.schema.is_some(),
            has_sql_query: self.sql_query.is_some(),
            has_data: self.data.is_some(),
            has_chart: self.chart_path.is_some(),
            route: self.route,
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
            timing: self.step_times.clone(),
        }
    }

    /// Replace oversized schema/data with short placeholders.
    pub fn clear_large_fields(&mut self) {
        let oversized = self.data.as_ref().and_then(|data| {
            let len = serde_json::to_string(&data.rows).map(|s| s.len()).unwrap_or(0);
            (len > LARGE_DATA_CHARS).then(|| (data.row_count(), len))
        });
        if let Some((rows, len)) = oversized {
            if let Some(data) = self.data.as_mut() {
                data.rows.clear();
            }
            self.record_warning(
                "data",
                format!("[Large dataset cleared - {} rows, {} chars]", rows, len),
            );
        }
        if let Some(schema) = &self.schema {
            if schema.len() > LARGE_SCHEMA_CHARS {
                self.schema = Some(format!("[Schema cleared - {} chars]", schema.len()));
            }
        }
    }
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_round_trips_through_serde() {
        let question = "Show total sales by région, with “quotes” and\nnewlines\t";
        let state = AnalysisState::new(question);
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: AnalysisState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.question, question);
        assert!(decoded.route.is_none());
        assert!(decoded.errors.is_empty());
    }

    #[test]
    fn test_record_step_updates_total() {
        let mut state = AnalysisState::new("q");
        state.record_step("get_schema", Instant::now());
        assert!(state.step_times.contains_key("get_schema"));
        assert!(state.step_times.contains_key(TOTAL_ELAPSED));
        assert!(state.total_ms() >= 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut state = AnalysisState::new("q");
        state.route = Some(Route::Chart);
        state.record_error("chart_generation", "boom");
        state.record_warning("routing", "defaulted");
        let summary = state.summary();
        assert!(summary.has_question);
        assert!(!summary.has_data);
        assert_eq!(summary.route, Some(Route::Chart));
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.warning_count, 1);
    }

    #[test]
    fn test_clear_large_fields() {
        let mut state = AnalysisState::new("q");
        state.schema = Some("x".repeat(600));
        state.data = Some(QueryResult {
            columns: vec!["c".to_string()],
            rows: (0..200).map(|i| vec![json!(format!("row-{}", i))]).collect(),
        });
        state.clear_large_fields();
        assert_eq!(state.schema.as_deref(), Some("[Schema cleared - 600 chars]"));
        let data = state.data.as_ref().unwrap();
        assert!(data.rows.is_empty());
        assert_eq!(data.columns, vec!["c".to_string()]);
        assert!(state.warnings["data"].starts_with("[Large dataset cleared - 200 rows"));
    }

    #[test]
    fn test_small_fields_are_kept() {
        let mut state = AnalysisState::new("q");
        state.schema = Some("Table: t (1 rows)".to_string());
        state.data = Some(QueryResult {
            columns: vec!["c".to_string()],
            rows: vec![vec![json!(1)]],
        });
        state.clear_large_fields();
        assert_eq!(state.schema.as_deref(), Some("Table: t (1 rows)"));
        assert_eq!(state.data.as_ref().unwrap().row_count(), 1);
    }
}
