//! Model backend construction from the application config.
//!
//! The backend is built once at startup and shared by every request.

use analyst_core::config::ModelConfig;
use analyst_core::{AnalystConfig, BackendConfig, ChatBackend, LlmConfig, LlmError};

/// Create a chat backend from the application config.
///
/// Reads `[model] backend` to select Ollama or an OpenAI-compatible server.
/// Unknown names fall back to Ollama.
pub fn create_backend_from_config(
    config: &AnalystConfig,
) -> Result<Box<dyn ChatBackend>, LlmError> {
    let llm = llm_config(&config.model);

    let backend_cfg = match config.model.backend.as_str() {
        "openai" => BackendConfig::OpenAi(llm),
        "ollama" => BackendConfig::Ollama(llm),
        other => {
            tracing::warn!(backend = %other, "Unknown model backend, using ollama");
            BackendConfig::Ollama(llm)
        }
    };

    analyst_core::create_backend(backend_cfg)
}

fn llm_config(model: &ModelConfig) -> LlmConfig {
    // api_key stays None; the OpenAI client reads OPENAI_API_KEY itself.
    LlmConfig {
        temperature: model.temperature,
        timeout_seconds: model.timeout_seconds,
        ..LlmConfig::new(&model.base_url, &model.name)
    }
}
