//! Per-session conversation history, kept in memory for display only.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use analyst_core::{AnalysisState, Route};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub route: Route,
    pub processing_ms: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    /// Compacted pipeline state; large data and schema are replaced by
    /// placeholders.
    pub state: AnalysisState,
}

impl HistoryEntry {
    pub fn new(answer: impl Into<String>, mut state: AnalysisState) -> Self {
        state.clear_large_fields();
        Self {
            question: state.question.clone(),
            answer: answer.into(),
            route: state.route.unwrap_or_default(),
            processing_ms: state.total_ms(),
            success: !state.has_errors(),
            timestamp: Utc::now(),
            state,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Questions plus answers.
    pub message_count: usize,
    pub query_count: usize,
    pub success_count: usize,
    pub avg_processing_ms: f64,
}

struct Session {
    entries: VecDeque<HistoryEntry>,
    /// Tick of the last append; the smallest is evicted first.
    last_used: u64,
}

pub struct HistoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    clock: AtomicU64,
    max_entries: usize,
    max_sessions: usize,
}

impl HistoryStore {
    /// `max_entries == 0` or `max_sessions == 0` disables history.
    pub fn new(max_entries: usize, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            max_entries,
            max_sessions,
        }
    }

    pub async fn append(&self, session: Uuid, entry: HistoryEntry) {
        if self.max_entries == 0 || self.max_sessions == 0 {
            return;
        }
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(&session) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                sessions.remove(&id);
                tracing::debug!(session = %id, "Evicted least recently used history session");
            }
        }

        let slot = sessions.entry(session).or_insert_with(|| Session {
            entries: VecDeque::new(),
            last_used: tick,
        });
        slot.last_used = tick;
        slot.entries.push_back(entry);
        while slot.entries.len() > self.max_entries {
            slot.entries.pop_front();
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self, session: Uuid) -> Vec<HistoryEntry> {
        self.sessions
            .read()
            .await
            .get(&session)
            .map(|s| s.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a session's history. Returns how many entries were removed.
    pub async fn clear(&self, session: Uuid) -> usize {
        self.sessions
            .write()
            .await
            .remove(&session)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    pub async fn stats(&self, session: Uuid) -> HistoryStats {
        let sessions = self.sessions.read().await;
        let Some(entries) = sessions.get(&session).map(|s| &s.entries) else {
            return HistoryStats::default();
        };

        let query_count = entries.len();
        let total_ms: f64 = entries.iter().map(|e| e.processing_ms).sum();
        HistoryStats {
            message_count: query_count * 2,
            query_count,
            success_count: entries.iter().filter(|e| e.success).count(),
            avg_processing_ms: if query_count > 0 {
                total_ms / query_count as f64
            } else {
                0.0
            },
        }
    }
}
