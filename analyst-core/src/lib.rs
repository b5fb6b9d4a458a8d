pub mod api;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;

pub use chart::{Aggregation, ChartError, ChartSpec, ChartStore, ChartType};
pub use config::AnalystConfig;
pub use error::AnalystError;
pub use llm::{
    create_backend, BackendConfig, ChatBackend, LlmConfig, LlmError, OllamaClient,
    OpenAiClient,
};
pub use models::{AnalysisState, QueryResult, Route, SchemaInfo};
