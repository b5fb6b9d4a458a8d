pub mod result;
pub mod route;
pub mod schema;
pub mod state;

pub use result::QueryResult;
pub use route::Route;
pub use schema::{ColumnInfo, SchemaInfo, TableInfo};
pub use state::{AnalysisState, StateSummary};
