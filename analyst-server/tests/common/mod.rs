//! Shared fixtures: an in-memory sales table and a model that replays canned
//! replies in call order.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use analyst_core::{AnalystConfig, ChatBackend, LlmError};
use analyst_server::router::AppContext;
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: &[Result<&str, &str>]) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User messages sent so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LlmError::Api { code: 503, message }),
            None => Err(LlmError::EmptyResponse),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test"
    }
}

pub async fn sales_pool() -> SqlitePool {
    let pool = analyst_core::db::memory_pool().await.unwrap();
    sqlx::query("CREATE TABLE sales (Region TEXT, Sale INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO sales (Region, Sale) VALUES ('North', 100)")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub fn test_config() -> AnalystConfig {
    let mut config = AnalystConfig::default();
    config.charts.output_dir = std::env::temp_dir()
        .join(format!("analyst-it-{}", Uuid::new_v4()))
        .display()
        .to_string();
    config
}

pub async fn context(backend: Arc<ScriptedBackend>) -> Arc<AppContext> {
    Arc::new(AppContext::new(sales_pool().await, test_config(), backend))
}
