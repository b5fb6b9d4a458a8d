//! The pipeline: schema -> route -> (sql | chart).
//!
//! Exactly one branch runs per question. Every step folds its failures into
//! the state, so [`Workflow::run`] always returns a state and never an error.

use std::sync::Arc;

use analyst_core::config::ChartConfig;
use analyst_core::{AnalysisState, ChartStore, ChatBackend, Route};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::chart::{self, ChartContext};
use super::{route, schema, sql};

pub struct Workflow {
    backend: Arc<dyn ChatBackend>,
    pool: SqlitePool,
    store: ChartStore,
    charts: ChartConfig,
}

impl Workflow {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        pool: SqlitePool,
        store: ChartStore,
        charts: ChartConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            store,
            charts,
        }
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub fn store(&self) -> &ChartStore {
        &self.store
    }

    pub async fn run(&self, question: &str, session_id: Option<Uuid>) -> AnalysisState {
        let mut state = AnalysisState::new(question).with_session(session_id);
        tracing::info!(session = ?session_id, "Processing question");

        let schema = schema::get_schema(&mut state, &self.pool).await;

        match route::route_question(&mut state, self.backend.as_ref()).await {
            Route::Sql => sql::run_sql_query(&mut state, self.backend.as_ref(), &self.pool).await,
            Route::Chart => {
                let ctx = ChartContext {
                    backend: self.backend.as_ref(),
                    pool: &self.pool,
                    schema: &schema,
                    store: &self.store,
                    config: &self.charts,
                };
                chart::generate_chart(&mut state, &ctx).await;
            }
        }

        let summary = state.summary();
        if state.has_errors() {
            tracing::warn!(?summary, errors = ?state.errors, "Question processed with errors");
        } else {
            tracing::info!(
                route = ?summary.route,
                total_ms = state.total_ms(),
                "Question processed"
            );
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::testing::{sales_pool, ScriptedBackend};

    fn workflow(backend: ScriptedBackend, pool: SqlitePool) -> Workflow {
        let dir = std::env::temp_dir().join(format!("analyst-workflow-{}", Uuid::new_v4()));
        Workflow::new(
            Arc::new(backend),
            pool,
            ChartStore::new(dir, 5),
            ChartConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_sql_branch_only() {
        let pool = sales_pool().await;
        let wf = workflow(
            ScriptedBackend::new(vec![Ok("sql"), Ok("SELECT COUNT(*) AS n FROM sales")]),
            pool,
        );
        let state = wf.run("How many sales?", None).await;

        assert_eq!(state.route, Some(Route::Sql));
        assert!(!state.has_errors(), "{:?}", state.errors);
        assert!(state.step_times.contains_key(schema::STEP));
        assert!(state.step_times.contains_key(sql::STEP));
        assert!(!state.step_times.contains_key(chart::STEP));
    }

    #[tokio::test]
    async fn test_question_survives_pipeline() {
        let pool = sales_pool().await;
        let question = "  Wie hoch sind die Umsätze?\n\"quoted\" ";
        let wf = workflow(ScriptedBackend::new(vec![Err("down"), Err("down")]), pool);
        let session = Uuid::new_v4();
        let state = wf.run(question, Some(session)).await;

        assert_eq!(state.question, question);
        assert_eq!(state.session_id, Some(session));
        assert_eq!(state.route, Some(Route::Sql));
        assert!(state.errors.contains_key("routing"));
        assert!(state.errors.contains_key("sql_execution"));
    }
}
