use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChartError;
use crate::db::quote_ident;
use crate::llm::extract_json_object;
use crate::models::{QueryResult, SchemaInfo};

/// Upper bound on categories drawn by bar and pie charts.
pub const MAX_CATEGORIES: usize = 50;

/// Upper bound on points drawn by line and scatter charts.
pub const MAX_POINTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    None,
    Sum,
    #[serde(alias = "mean", alias = "average")]
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregation {
    fn sql_function(&self) -> Option<&'static str> {
        match self {
            Aggregation::None => None,
            Aggregation::Sum => Some("SUM"),
            Aggregation::Avg => Some("AVG"),
            Aggregation::Count => Some("COUNT"),
            Aggregation::Min => Some("MIN"),
            Aggregation::Max => Some("MAX"),
        }
    }
}

/// What to draw, as proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub table: String,
    pub x: String,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub title: Option<String>,
}

/// A spec whose table and columns were found in the schema, spelled the way
/// the store spells them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChart {
    pub spec: ChartSpec,
    pub table: String,
    pub x: String,
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub label: String,
    /// Numeric x, when the x column holds numbers.
    pub x: Option<f64>,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn is_numeric_x(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.x.is_some())
    }
}

impl ChartSpec {
    /// Parse a model reply, tolerating code fences and prose around the JSON.
    /// `chart_type` and `aggregation` are matched case-insensitively, and a
    /// null aggregation means none.
    pub fn parse(reply: &str) -> Result<ChartSpec, ChartError> {
        let json = extract_json_object(reply)
            .ok_or_else(|| ChartError::Parse("no JSON object in reply".to_string()))?;
        let mut value: Value =
            serde_json::from_str(&json).map_err(|e| ChartError::Parse(e.to_string()))?;

        if let Some(fields) = value.as_object_mut() {
            for key in ["chart_type", "aggregation"] {
                if fields.get(key).is_some_and(Value::is_null) {
                    fields.remove(key);
                }
                if let Some(Value::String(name)) = fields.get_mut(key) {
                    *name = name.trim().to_ascii_lowercase();
                }
            }
        }

        serde_json::from_value(value).map_err(|e| ChartError::Parse(e.to_string()))
    }

    pub fn display_title(&self) -> String {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => match (&self.y, self.aggregation) {
                (_, Aggregation::Count) => format!("Count by {}", self.x),
                (Some(y), Aggregation::None) => format!("{} vs {}", y, self.x),
                (Some(y), agg) => format!("{:?} of {} by {}", agg, y, self.x),
                (None, _) => self.x.clone(),
            },
        }
    }

    /// Check table and columns against the live schema.
    pub fn resolve(&self, schema: &SchemaInfo) -> Result<ResolvedChart, ChartError> {
        let table = schema
            .table(&self.table)
            .ok_or_else(|| ChartError::UnknownTable(self.table.clone()))?;

        let column = |name: &str| {
            table
                .column(name)
                .map(|c| c.name.clone())
                .ok_or_else(|| ChartError::UnknownColumn {
                    table: table.name.clone(),
                    column: name.to_string(),
                })
        };

        let x = column(&self.x)?;
        let y = match (&self.y, self.aggregation) {
            (Some(y), _) if !y.trim().is_empty() => Some(column(y)?),
            (_, Aggregation::Count) => None,
            _ => return Err(ChartError::MissingField("y")),
        };

        Ok(ResolvedChart {
            spec: self.clone(),
            table: table.name.clone(),
            x,
            y,
        })
    }
}

impl ResolvedChart {
    /// The fixed query that feeds the renderer. Identifiers come from the
    /// schema and are quoted; nothing from the model is interpolated raw.
    pub fn query(&self) -> String {
        let table = quote_ident(&self.table);
        let x = quote_ident(&self.x);

        let value_expr = match (self.spec.aggregation.sql_function(), &self.y) {
            (Some("COUNT"), None) => "COUNT(*)".to_string(),
            (Some(func), Some(y)) => format!("{}({})", func, quote_ident(y)),
            (None, Some(y)) => quote_ident(y),
            // resolve() guarantees y unless counting
            (_, None) => "COUNT(*)".to_string(),
        };

        let limit = match self.spec.chart_type {
            ChartType::Bar | ChartType::Pie => MAX_CATEGORIES,
            ChartType::Line | ChartType::Scatter => MAX_POINTS,
        };

        if self.spec.aggregation == Aggregation::None {
            format!(
                "SELECT {x}, {value_expr} FROM {table} WHERE {x} IS NOT NULL ORDER BY {x} LIMIT {limit}"
            )
        } else {
            format!(
                "SELECT {x}, {value_expr} FROM {table} WHERE {x} IS NOT NULL GROUP BY {x} ORDER BY {x} LIMIT {limit}"
            )
        }
    }

    /// Turn two-column query output into plottable points. Rows whose value
    /// is not numeric are dropped.
    pub fn series(&self, result: &QueryResult) -> Result<Series, ChartError> {
        let points: Vec<Point> = result
            .rows
            .iter()
            .filter_map(|row| {
                let label_value = row.first()?;
                let y = as_number(row.get(1)?)?;
                Some(Point {
                    label: label_text(label_value),
                    x: as_number(label_value),
                    y,
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ChartError::EmptySeries);
        }

        let y_label = match (&self.y, self.spec.aggregation) {
            (None, _) => "count".to_string(),
            (Some(y), Aggregation::None) => y.clone(),
            (Some(y), agg) => format!("{}({})", format!("{:?}", agg).to_lowercase(), y),
        };

        Ok(Series {
            x_label: self.x.clone(),
            y_label,
            points,
        })
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn label_text(value: &Value) -> String {
    match value {
        Value::Null => "(null)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, TableInfo};
    use serde_json::json;

    fn schema() -> SchemaInfo {
        SchemaInfo::from_tables(vec![TableInfo {
            name: "sales".to_string(),
            row_count: 3,
            columns: ["Region", "Sale", "Month"]
                .iter()
                .map(|n| ColumnInfo {
                    name: n.to_string(),
                    data_type: "TEXT".to_string(),
                    nullable: true,
                    primary_key: false,
                })
                .collect(),
        }])
    }

    fn bar_spec() -> ChartSpec {
        ChartSpec {
            chart_type: ChartType::Bar,
            table: "SALES".to_string(),
            x: "region".to_string(),
            y: Some("sale".to_string()),
            aggregation: Aggregation::Sum,
            title: None,
        }
    }

    #[test]
    fn test_parse_fenced_reply_with_aliases() {
        let reply = r#"Here is the chart:
```json
{"chart_type": "pie", "table": "sales", "x": "Region", "y": "Sale", "aggregation": "mean"}
```"#;
        let spec = ChartSpec::parse(reply).unwrap();
        assert_eq!(spec.chart_type, ChartType::Pie);
        assert_eq!(spec.aggregation, Aggregation::Avg);
        assert!(spec.title.is_none());
    }

    #[test]
    fn test_parse_ignores_enum_casing() {
        let spec = ChartSpec::parse(
            r#"{"chart_type": "Bar", "table": "sales", "x": "Region", "y": "Sale", "aggregation": "SUM"}"#,
        )
        .unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.aggregation, Aggregation::Sum);

        let spec = ChartSpec::parse(
            r#"{"chart_type": " LINE ", "table": "sales", "x": "Month", "y": "Sale", "aggregation": "Average"}"#,
        )
        .unwrap();
        assert_eq!(spec.chart_type, ChartType::Line);
        assert_eq!(spec.aggregation, Aggregation::Avg);
        // Identifiers keep their spelling; resolve() matches them later.
        assert_eq!(spec.x, "Month");
    }

    #[test]
    fn test_parse_null_aggregation_is_none() {
        let spec = ChartSpec::parse(
            r#"{"chart_type": "Scatter", "table": "sales", "x": "Month", "y": "Sale", "aggregation": null}"#,
        )
        .unwrap();
        assert_eq!(spec.chart_type, ChartType::Scatter);
        assert_eq!(spec.aggregation, Aggregation::None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ChartSpec::parse("import matplotlib.pyplot as plt"),
            Err(ChartError::Parse(_))
        ));
        assert!(matches!(
            ChartSpec::parse(r#"{"chart_type": "radar", "table": "t", "x": "a"}"#),
            Err(ChartError::Parse(_))
        ));
    }

    #[test]
    fn test_resolve_uses_schema_spelling() {
        let resolved = bar_spec().resolve(&schema()).unwrap();
        assert_eq!(resolved.table, "sales");
        assert_eq!(resolved.x, "Region");
        assert_eq!(resolved.y.as_deref(), Some("Sale"));
        assert_eq!(
            resolved.query(),
            r#"SELECT "Region", SUM("Sale") FROM "sales" WHERE "Region" IS NOT NULL GROUP BY "Region" ORDER BY "Region" LIMIT 50"#
        );
    }

    #[test]
    fn test_resolve_rejects_unknown_names() {
        let mut spec = bar_spec();
        spec.table = "orders".to_string();
        assert!(matches!(
            spec.resolve(&schema()),
            Err(ChartError::UnknownTable(t)) if t == "orders"
        ));

        let mut spec = bar_spec();
        spec.y = Some("Sale); DROP TABLE sales; --".to_string());
        assert!(matches!(
            spec.resolve(&schema()),
            Err(ChartError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_count_needs_no_y_but_others_do() {
        let mut spec = bar_spec();
        spec.y = None;
        assert!(matches!(
            spec.resolve(&schema()),
            Err(ChartError::MissingField("y"))
        ));

        spec.aggregation = Aggregation::Count;
        let resolved = spec.resolve(&schema()).unwrap();
        assert!(resolved.query().contains("COUNT(*)"));
    }

    #[test]
    fn test_raw_scatter_query_has_no_group_by() {
        let spec = ChartSpec {
            chart_type: ChartType::Scatter,
            table: "sales".to_string(),
            x: "Month".to_string(),
            y: Some("Sale".to_string()),
            aggregation: Aggregation::None,
            title: Some("Sales over months".to_string()),
        };
        let query = spec.resolve(&schema()).unwrap().query();
        assert!(!query.contains("GROUP BY"));
        assert!(query.ends_with("LIMIT 1000"));
        assert_eq!(spec.display_title(), "Sales over months");
    }

    #[test]
    fn test_series_skips_non_numeric_values() {
        let resolved = bar_spec().resolve(&schema()).unwrap();
        let result = QueryResult {
            columns: vec!["Region".to_string(), "SUM(Sale)".to_string()],
            rows: vec![
                vec![json!("North"), json!(100)],
                vec![json!("South"), json!("n/a")],
                vec![json!("West"), json!("12.5")],
                vec![Value::Null, json!(3)],
            ],
        };
        let series = resolved.series(&result).unwrap();
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[1].label, "West");
        assert_eq!(series.points[1].y, 12.5);
        assert_eq!(series.points[2].label, "(null)");
        assert_eq!(series.y_label, "sum(Sale)");
        assert!(!series.is_numeric_x());
    }

    #[test]
    fn test_empty_series_is_error() {
        let resolved = bar_spec().resolve(&schema()).unwrap();
        let result = QueryResult {
            columns: vec!["Region".to_string(), "v".to_string()],
            rows: vec![],
        };
        assert!(matches!(
            resolved.series(&result),
            Err(ChartError::EmptySeries)
        ));
    }

    #[test]
    fn test_default_titles() {
        let mut spec = bar_spec();
        assert_eq!(spec.display_title(), "Sum of sale by region");
        spec.aggregation = Aggregation::Count;
        assert_eq!(spec.display_title(), "Count by region");
    }
}
