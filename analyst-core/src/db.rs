use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, SqlitePool, Statement, TypeInfo, ValueRef};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{ColumnInfo, QueryResult, SchemaInfo, TableInfo};

/// Build the pool without touching the database. A missing or unreadable
/// file surfaces on first use instead of at startup.
pub fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?;
    Ok(SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_lazy_with(options))
}

/// Private in-memory database on a single connection, so every query sees
/// the same data.
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

pub async fn health_check(pool: &SqlitePool) -> Result<String> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Double-quote an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Introspect tables, columns and row counts. Never fails: errors come back
/// inside the returned [`SchemaInfo`].
pub async fn read_schema(pool: &SqlitePool) -> SchemaInfo {
    match load_tables(pool).await {
        Ok(tables) => {
            tracing::debug!(tables = tables.len(), "Schema extracted");
            SchemaInfo::from_tables(tables)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error getting schema");
            SchemaInfo::from_error(e.to_string())
        }
    }
}

async fn load_tables(pool: &SqlitePool) -> std::result::Result<Vec<TableInfo>, sqlx::Error> {
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::with_capacity(names.len());
    for (name,) in names {
        let columns: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(&name)
        .fetch_all(pool)
        .await?;

        let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&name));
        let (row_count,): (i64,) = sqlx::query_as(&count_sql).fetch_one(pool).await?;

        tables.push(TableInfo {
            name,
            row_count,
            columns: columns
                .into_iter()
                .map(|(name, data_type, notnull, pk)| ColumnInfo {
                    name,
                    data_type: if data_type.is_empty() {
                        "ANY".to_string()
                    } else {
                        data_type
                    },
                    nullable: notnull == 0,
                    primary_key: pk > 0,
                })
                .collect(),
        });
    }

    Ok(tables)
}

/// Execute `sql` as given and collect every returned row.
pub async fn execute_query(pool: &SqlitePool, sql: &str) -> Result<QueryResult> {
    let rows: Vec<SqliteRow> = sqlx::query(sql).fetch_all(pool).await?;

    let columns: Vec<String> = match rows.first() {
        Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            // No row to read names from; ask the prepared statement instead.
            match pool.prepare(sql).await {
                Ok(stmt) => stmt.columns().iter().map(|c| c.name().to_string()).collect(),
                Err(_) => Vec::new(),
            }
        }
    };

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode_value(row, idx)).collect())
        .collect::<Vec<Vec<Value>>>();

    tracing::info!(rows = rows.len(), "Query executed successfully");
    Ok(QueryResult { columns, rows })
}

/// Decode by SQLite storage class. Anything unrecognized is read back as text.
fn decode_value(row: &SqliteRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    let decoded = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).ok().map(Value::from),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(idx).ok().map(Value::from),
        "TEXT" => row.try_get::<String, _>(idx).ok().map(Value::from),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|bytes| Value::from(hex(&bytes))),
        _ => None,
    };

    decoded
        .or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(Value::from))
        .unwrap_or(Value::Null)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
