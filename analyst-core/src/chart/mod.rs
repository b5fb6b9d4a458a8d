//! Declarative charts: a model proposes a [`ChartSpec`], the spec is checked
//! against the live schema, turned into a fixed query, and the resulting
//! series is drawn by the SVG renderer. Rendered files live in a
//! [`ChartStore`].

pub mod render;
pub mod spec;
pub mod store;

use thiserror::Error;

pub use render::render_svg;
pub use spec::{Aggregation, ChartSpec, ChartType, Point, ResolvedChart, Series};
pub use store::ChartStore;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Could not parse chart specification: {0}")]
    Parse(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Chart specification is missing '{0}'")]
    MissingField(&'static str),

    #[error("No plottable values in the query result")]
    EmptySeries,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
