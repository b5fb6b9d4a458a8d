//! Routing step: one model call decides between the SQL and chart paths.
//!
//! Whatever the model says, the state ends up with `Route::Sql` or
//! `Route::Chart`. Anything unexpected, including a failed call, is `Sql`.

use std::time::Instant;

use analyst_core::{AnalysisState, ChatBackend, Route};

pub const STEP: &str = "route_question";

pub const ROUTER_PROMPT: &str = "You are an expert at routing a user question to a specialist agent. \
Based on the user question, determine whether the user is asking a question that requires \
querying a database, or a question that requires creating a chart or visualization. \
If the user is asking for data, statistics, counts, or database queries, respond with 'sql'. \
If the user is asking for charts, graphs, plots, or visualizations, respond with 'chart'. \
Do not respond with any other words, only 'sql' or 'chart'. \
When in doubt, default to 'sql'.";

pub async fn route_question(state: &mut AnalysisState, backend: &dyn ChatBackend) -> Route {
    let started = Instant::now();

    let route = if state.question.trim().is_empty() {
        tracing::error!("No question provided for routing");
        state.record_warning("routing", "Empty question, defaulted to sql");
        Route::Sql
    } else {
        match backend.complete(ROUTER_PROMPT, &state.question).await {
            Ok(reply) => match Route::parse_reply(&reply) {
                Some(route) => route,
                None => {
                    tracing::warn!(reply = %reply, "Unrecognized route, defaulting to sql");
                    state.record_warning(
                        "routing",
                        format!("Unrecognized route '{}', defaulted to sql", reply),
                    );
                    Route::Sql
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Error during question routing");
                state.record_error("routing", format!("Error during question routing: {}", e));
                Route::Sql
            }
        }
    };

    tracing::info!(route = %route, "Question routed");
    state.route = Some(route);
    state.record_step(STEP, started);
    route
}
