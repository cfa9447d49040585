//! Persistence boundaries for conversation history and traces.
//!
//! Both traits are out-of-scope for concrete (database, filesystem) backends
//! — this crate ships only the in-memory reference implementations used by
//! its own tests, mirroring how `LLMClient`/`ToolSet` are specified as traits
//! with no bundled provider integration.

use crate::error::Result;
use crate::history::History;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Where an `Agent` loads and saves the conversation record between runs.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<History>>;
    async fn save(&self, session_id: &str, history: &History) -> Result<()>;
}

/// In-memory `HistoryRepository`, keyed by session id.
#[derive(Default)]
pub struct InMemoryHistoryRepository {
    histories: Mutex<HashMap<String, History>>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn load(&self, session_id: &str) -> Result<Option<History>> {
        Ok(self.histories.lock().unwrap().get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, history: &History) -> Result<()> {
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), history.clone());
        Ok(())
    }
}

/// Where a finished `Trace` (§4.8) is persisted. Implemented by
/// `crate::trace::TraceRepository` callers; redeclared here only for the
/// in-memory reference so tests don't need to depend on `trace`'s own
/// narrower trait if they only care about storage.
#[async_trait]
pub trait TraceRepository: Send + Sync {
    async fn save(&self, trace_id: &str, trace: Value) -> Result<()>;
    async fn load(&self, trace_id: &str) -> Result<Option<Value>>;
}

/// In-memory `TraceRepository`, keyed by trace id.
#[derive(Default)]
pub struct InMemoryTraceRepository {
    traces: Mutex<HashMap<String, Value>>,
}

impl InMemoryTraceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceRepository for InMemoryTraceRepository {
    async fn save(&self, trace_id: &str, trace: Value) -> Result<()> {
        self.traces.lock().unwrap().insert(trace_id.to_string(), trace);
        Ok(())
    }

    async fn load(&self, trace_id: &str) -> Result<Option<Value>> {
        Ok(self.traces.lock().unwrap().get(trace_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Message;

    #[tokio::test]
    async fn test_history_repository_round_trip() {
        let repo = InMemoryHistoryRepository::new();
        assert!(repo.load("s1").await.unwrap().is_none());

        let mut history = History::new("test");
        history.push(Message::user("hi"));
        repo.save("s1", &history).await.unwrap();

        let loaded = repo.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_trace_repository_round_trip() {
        let repo = InMemoryTraceRepository::new();
        let trace = serde_json::json!({"trace_id": "t1"});
        repo.save("t1", trace.clone()).await.unwrap();
        let loaded = repo.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded, trace);
    }
}
