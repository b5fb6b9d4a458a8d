use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Case-insensitive column lookup, returning the stored spelling.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Live snapshot of the store's tables.
///
/// When introspection fails `error` is set and `schema_text` carries the
/// message, so callers can still hand the text to a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub tables: Vec<TableInfo>,
    pub schema_text: String,
    pub error: Option<String>,
}

impl SchemaInfo {
    pub fn from_tables(tables: Vec<TableInfo>) -> Self {
        let schema_text = render_schema_text(&tables);
        Self {
            tables,
            schema_text,
            error: None,
        }
    }

    pub fn from_error(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tables: Vec::new(),
            schema_text: format!("Error retrieving schema: {}", error),
            error: Some(error),
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

fn render_schema_text(tables: &[TableInfo]) -> String {
    if tables.is_empty() {
        return "No tables found in database".to_string();
    }

    let mut lines = Vec::new();
    for table in tables {
        lines.push(format!("Table: {} ({} rows)", table.name, table.row_count));
        for col in &table.columns {
            let mut line = format!("  - {} ({})", col.name, col.data_type);
            if col.primary_key {
                line.push_str(" [PRIMARY KEY]");
            }
            if !col.nullable {
                line.push_str(" [NOT NULL]");
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}
