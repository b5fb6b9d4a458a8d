use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows returned by an executed query, kept as JSON values so they can be
/// shown, serialized and fed back to a model without further typing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pipe-separated text table, at most `max_rows` rows.
    pub fn to_text(&self, max_rows: usize) -> String {
        if self.columns.is_empty() {
            return "(no columns)".to_string();
        }

        let mut out = self.columns.join(" | ");
        for row in self.rows.iter().take(max_rows) {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            out.push_str(&cells.join(" | "));
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!("\n... {} more rows", self.rows.len() - max_rows));
        }
        out
    }
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["Region".to_string(), "total".to_string()],
            rows: vec![
                vec![json!("North"), json!(100)],
                vec![json!("South"), Value::Null],
                vec![json!("East"), json!(12.5)],
            ],
        }
    }

    #[test]
    fn test_to_text_truncates() {
        let text = sample().to_text(2);
        assert_eq!(
            text,
            "Region | total\nNorth | 100\nSouth | NULL\n... 1 more rows"
        );
    }

    #[test]
    fn test_empty_result() {
        let empty = QueryResult::default();
        assert!(empty.is_empty());
        assert_eq!(empty.to_text(10), "(no columns)");
    }
}
