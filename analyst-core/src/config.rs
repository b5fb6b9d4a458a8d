use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalystConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub charts: ChartConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/sales.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Filesystem path of the database, or `None` for in-memory URLs.
    pub fn file_path(&self) -> Option<PathBuf> {
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// "ollama" or "openai"
    pub backend: String,
    pub base_url: String,
    pub name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            name: "mistral".to_string(),
            temperature: 0.0,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub output_dir: String,
    pub keep_latest: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/charts".to_string(),
            keep_latest: 5,
            width: 800,
            height: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept per session.
    pub max_entries: usize,
    /// Sessions kept at once; the least recently used one is dropped first.
    pub max_sessions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_sessions: 1000,
        }
    }
}

/// Outcome of [`AnalystConfig::validate`]. Errors and warnings are both
/// reported at startup; neither stops the server.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AnalystConfig {
    /// Load from a TOML file (optional) layered with `ANALYST__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ANALYST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(s.try_deserialize()?)
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.model.name.trim().is_empty() {
            report.errors.push("Invalid model name: empty".to_string());
        }
        if !matches!(self.model.backend.as_str(), "ollama" | "openai") {
            report.warnings.push(format!(
                "Unknown model backend '{}', falling back to ollama",
                self.model.backend
            ));
        }
        if self.charts.keep_latest == 0 {
            report
                .errors
                .push("charts.keep_latest must be at least 1".to_string());
        }
        if self.charts.width < 200 || self.charts.height < 150 {
            report.warnings.push(format!(
                "Chart size {}x{} is very small",
                self.charts.width, self.charts.height
            ));
        }
        if self.history.max_entries == 0 {
            report
                .warnings
                .push("history.max_entries is 0, conversation history is disabled".to_string());
        }
        if self.history.max_sessions == 0 {
            report
                .warnings
                .push("history.max_sessions is 0, conversation history is disabled".to_string());
        }

        match self.database.file_path() {
            Some(path) if !path.exists() => {
                report
                    .warnings
                    .push(format!("Database file does not exist: {}", path.display()));
            }
            _ => {}
        }

        let chart_dir = Path::new(&self.charts.output_dir);
        if chart_dir.exists() && !chart_dir.is_dir() {
            report.errors.push(format!(
                "Chart output path is not a directory: {}",
                chart_dir.display()
            ));
        }

        report
    }
}
