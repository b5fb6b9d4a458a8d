//! Schema step: snapshot the live table layout into the state.

use std::time::Instant;

use analyst_core::{AnalysisState, SchemaInfo};
use sqlx::SqlitePool;

pub const STEP: &str = "get_schema";

/// Read the schema and store its text form. A read failure is recorded under
/// `errors["schema"]`; the error text still lands in `state.schema` so the
/// later steps see why.
pub async fn get_schema(state: &mut AnalysisState, pool: &SqlitePool) -> SchemaInfo {
    let started = Instant::now();
    tracing::info!("Starting database schema extraction");

    let schema = analyst_core::db::read_schema(pool).await;
    state.schema = Some(schema.schema_text.clone());

    match &schema.error {
        Some(e) => {
            tracing::error!(error = %e, "Schema extraction error");
            state.record_error("schema", e.clone());
        }
        None => tracing::info!(tables = schema.table_count(), "Schema extracted"),
    }

    state.record_step(STEP, started);
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::testing::sales_pool;

    #[tokio::test]
    async fn test_schema_text_lands_in_state() {
        let pool = sales_pool().await;
        let mut state = AnalysisState::new("q");
        let schema = get_schema(&mut state, &pool).await;

        assert_eq!(schema.table_count(), 1);
        let text = state.schema.as_deref().unwrap();
        assert!(text.starts_with("Table: sales (1 rows)"));
        assert!(!state.has_errors());
        assert!(state.step_times.contains_key(STEP));
    }

    #[tokio::test]
    async fn test_closed_pool_records_error() {
        let pool = sales_pool().await;
        pool.close().await;
        let mut state = AnalysisState::new("q");
        get_schema(&mut state, &pool).await;

        assert!(state.errors.contains_key("schema"));
        assert!(state
            .schema
            .as_deref()
            .unwrap()
            .starts_with("Error retrieving schema:"));
    }
}
