use std::sync::Arc;

use analyst_core::api::{AnalystRequest, AnalystResponse, PROTOCOL};
use analyst_core::{AnalystConfig, ChatBackend};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::subsystems::history::{HistoryEntry, HistoryStore};
use crate::subsystems::respond::AnalysisResponse;
use crate::subsystems::workflow::Workflow;

/// Everything a request handler can reach. Built once at startup.
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: AnalystConfig,
    pub workflow: Workflow,
    pub history: HistoryStore,
}

impl AppContext {
    pub fn new(pool: SqlitePool, config: AnalystConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let store = analyst_core::ChartStore::new(
            &config.charts.output_dir,
            config.charts.keep_latest,
        );
        let workflow = Workflow::new(backend, pool.clone(), store, config.charts.clone());
        let history = HistoryStore::new(config.history.max_entries, config.history.max_sessions);
        Self {
            pool,
            config,
            workflow,
            history,
        }
    }
}

pub async fn handle_request(request: AnalystRequest, ctx: &AppContext) -> AnalystResponse {
    match request {
        AnalystRequest::Ping => AnalystResponse::pong(),
        AnalystRequest::Health => {
            let db_ver = match analyst_core::db::health_check(&ctx.pool).await {
                Ok(v) => v,
                Err(e) => return AnalystResponse::err(format!("DB Health Check failed: {}", e)),
            };
            let backend = ctx.workflow.backend();
            let reachable = backend.health_check().await;
            if !reachable {
                tracing::warn!(backend = backend.name(), "Model backend unreachable");
            }
            AnalystResponse::ok(serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "database": db_ver,
                "model": {
                    "backend": backend.name(),
                    "model": backend.model(),
                    "reachable": reachable,
                },
                "chart_dir": ctx.workflow.store().dir().display().to_string(),
            }))
        }
        AnalystRequest::Version => AnalystResponse::ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "protocol": PROTOCOL,
        })),
        AnalystRequest::Schema => {
            let schema = analyst_core::db::read_schema(&ctx.pool).await;
            AnalystResponse::ok(serde_json::json!({
                "tables": schema.tables,
                "schema_text": schema.schema_text,
                "table_count": schema.table_count(),
                "error": schema.error,
            }))
        }
        AnalystRequest::Ask {
            question,
            session_id,
        } => match handle_ask(question, session_id, ctx).await {
            Ok(data) => AnalystResponse::ok(data),
            Err(e) => AnalystResponse::err(e.to_string()),
        },
        AnalystRequest::History { session_id } => {
            let entries = ctx.history.list(session_id).await;
            let stats = ctx.history.stats(session_id).await;
            AnalystResponse::ok(serde_json::json!({
                "session_id": session_id,
                "entries": entries,
                "stats": stats,
            }))
        }
        AnalystRequest::ClearHistory { session_id } => {
            let cleared = ctx.history.clear(session_id).await;
            tracing::info!(session = %session_id, cleared, "History cleared");
            AnalystResponse::ok(serde_json::json!({ "cleared": cleared }))
        }
    }
}

/// Run one question through the pipeline and remember it in the session.
async fn handle_ask(
    question: String,
    session_id: Option<Uuid>,
    ctx: &AppContext,
) -> anyhow::Result<serde_json::Value> {
    if question.trim().is_empty() {
        anyhow::bail!("question field is required");
    }

    let session = session_id.unwrap_or_else(Uuid::new_v4);
    let state = ctx.workflow.run(&question, Some(session)).await;
    let response = AnalysisResponse::from_state(&state);

    ctx.history
        .append(session, HistoryEntry::new(response.answer.clone(), state))
        .await;

    Ok(serde_json::to_value(&response)?)
}
