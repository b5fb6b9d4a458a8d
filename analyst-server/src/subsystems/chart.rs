//! Chart step: the model describes a chart, the server draws it.
//!
//! The model only ever returns a [`ChartSpec`]. The spec is checked against
//! the live schema, turned into a fixed query, and the result is drawn by the
//! SVG renderer. Failures end up in `errors["chart_generation"]` (model reply
//! unusable) or `errors["chart_render"]` (query, drawing or saving failed).

use std::path::PathBuf;
use std::time::Instant;

use analyst_core::chart::{render_svg, ResolvedChart};
use analyst_core::config::ChartConfig;
use analyst_core::{AnalysisState, ChartSpec, ChartStore, ChatBackend, SchemaInfo};
use anyhow::Result;
use sqlx::SqlitePool;

pub const STEP: &str = "generate_chart";

/// Rows of prior data shown to the model.
const DATA_PREVIEW_ROWS: usize = 20;

pub const CHART_PROMPT: &str = r#"You are an expert at designing charts for tabular data.
Based on the user question and the database schema, describe ONE chart that answers the question.
Respond with a single JSON object and nothing else, using exactly these keys:
{"chart_type": "bar" | "line" | "pie" | "scatter",
 "table": "<table name from the schema>",
 "x": "<column for categories or the horizontal axis>",
 "y": "<numeric column to plot, may be omitted only when aggregation is count>",
 "aggregation": "none" | "sum" | "avg" | "count" | "min" | "max",
 "title": "<short chart title>"}
Use table and column names exactly as they appear in the schema. Do not write code."#;

/// Everything the chart step needs besides the state.
pub struct ChartContext<'a> {
    pub backend: &'a dyn ChatBackend,
    pub pool: &'a SqlitePool,
    pub schema: &'a SchemaInfo,
    pub store: &'a ChartStore,
    pub config: &'a ChartConfig,
}

pub async fn generate_chart(state: &mut AnalysisState, ctx: &ChartContext<'_>) {
    let started = Instant::now();

    if state.question.trim().is_empty() {
        let msg = "Missing required state: question";
        tracing::error!("{}", msg);
        state.record_error("chart", msg);
        state.record_step(STEP, started);
        return;
    }

    let resolved = match design(state, ctx).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "Chart generation failed");
            state.record_error("chart_generation", format!("Error during chart generation: {}", e));
            state.record_step(STEP, started);
            return;
        }
    };

    match draw(state, &resolved, ctx).await {
        Ok(path) => {
            tracing::info!(
                path = %path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Chart generated"
            );
            state.chart_path = Some(path);
        }
        Err(e) => {
            tracing::error!(error = %e, "Chart rendering failed");
            state.record_error("chart_render", format!("Error rendering chart: {}", e));
        }
    }
    state.record_step(STEP, started);
}

/// Ask the model for a spec and resolve it against the schema.
async fn design(state: &mut AnalysisState, ctx: &ChartContext<'_>) -> Result<ResolvedChart> {
    let data = state
        .data
        .as_ref()
        .map(|d| d.to_text(DATA_PREVIEW_ROWS))
        .unwrap_or_else(|| "(none)".to_string());
    let user = format!(
        "Question: {}\n\nDatabase Schema:\n{}\n\nData: {}",
        state.question,
        state.schema.as_deref().unwrap_or(&ctx.schema.schema_text),
        data
    );

    let reply = ctx.backend.complete(CHART_PROMPT, &user).await?;
    let spec = ChartSpec::parse(&reply)?;
    tracing::debug!(?spec, "Chart spec parsed");
    state.chart_spec = Some(spec.clone());

    Ok(spec.resolve(ctx.schema)?)
}

/// Run the fixed query, draw it and store the file.
async fn draw(
    state: &mut AnalysisState,
    resolved: &ResolvedChart,
    ctx: &ChartContext<'_>,
) -> Result<PathBuf> {
    let query = resolved.query();
    tracing::debug!(query = %query, "Chart query");
    state.sql_query = Some(query.clone());

    let result = analyst_core::db::execute_query(ctx.pool, &query).await?;
    let series = resolved.series(&result);
    state.data = Some(result);

    let svg = render_svg(&resolved.spec, &series?, ctx.config.width, ctx.config.height)?;
    Ok(ctx.store.save(&svg).await?)
}
