//! Structured span tracing (§4.8).
//!
//! `Handler` records nested spans across agent/LLM/tool operations. Each
//! `Start*` call returns a derived context carrying a pointer to the new
//! span; the matching `End*` reads the span back out of that context. A
//! context produced by [`TraceContext::disabled`] makes every `Start*` a
//! no-op, per the spec's "if no current span is in context" rule — see the
//! Open Question decision in DESIGN.md for how the very first (root) span is
//! bootstrapped via [`TraceContext::root`] instead of being no-op'd away.

use crate::error::{Error, Result};
use crate::repository::TraceRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// The kind of operation a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    AgentExecute,
    LlmCall,
    ToolExec,
    SubAgent,
    Event,
}

/// Terminal status of a completed span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

/// One named, timed interval in the trace tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub kind: SpanKind,
    pub name: String,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub children: Vec<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_call: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_exec: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
}

impl Span {
    fn new(span_id: Uuid, parent_id: Option<Uuid>, kind: SpanKind, name: &str) -> Self {
        Span {
            span_id,
            parent_id,
            kind,
            name: name.to_string(),
            started_at: now_millis(),
            ended_at: None,
            duration_ms: None,
            status: SpanStatus::Ok,
            error: None,
            children: Vec::new(),
            llm_call: None,
            tool_exec: None,
            event: None,
        }
    }

    /// Find a span by id anywhere in this span's subtree (inclusive).
    fn find_mut(&mut self, id: Uuid) -> Option<&mut Span> {
        if self.span_id == id {
            return Some(self);
        }
        for child in &mut self.children {
            if let Some(found) = child.find_mut(id) {
                return Some(found);
            }
        }
        None
    }

    /// Check the well-formedness invariant from §8 property 9: every span's
    /// timestamps bound its children's.
    pub fn is_well_formed(&self) -> bool {
        let end = self.ended_at.unwrap_or(i64::MAX);
        for child in &self.children {
            if child.started_at < self.started_at || child.started_at > end {
                return false;
            }
            let child_end = child.ended_at.unwrap_or(i64::MAX);
            if child_end > end {
                return false;
            }
            if !child.is_well_formed() {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// TRACE CONTEXT
// ============================================================================

#[derive(Debug, Clone)]
enum ContextInner {
    Disabled,
    Single {
        trace_id: Uuid,
        current: Option<Uuid>,
    },
    Multi(Vec<TraceContext>),
}

/// The handle threaded through calls carrying "the current span pointer".
/// Cloning a `TraceContext` is cheap; it only carries ids, never a reference
/// to the span tree itself (that lives behind the handler's own mutex).
#[derive(Debug, Clone)]
pub struct TraceContext {
    inner: ContextInner,
}

impl TraceContext {
    /// A context that makes every `Start*` a no-op. Use when tracing is not
    /// configured for an execution.
    pub fn disabled() -> Self {
        TraceContext {
            inner: ContextInner::Disabled,
        }
    }

    /// A context with a trace id but no current span yet — the only state
    /// from which the first (root) span may be started.
    pub fn root(trace_id: Uuid) -> Self {
        TraceContext {
            inner: ContextInner::Single {
                trace_id,
                current: None,
            },
        }
    }

    fn multi(contexts: Vec<TraceContext>) -> Self {
        TraceContext {
            inner: ContextInner::Multi(contexts),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.inner, ContextInner::Disabled)
    }
}

// ============================================================================
// HANDLER
// ============================================================================

/// Paired span-recording calls across the four span kinds, plus zero-duration
/// events and a terminal flush/persist.
#[async_trait]
pub trait Handler: Send + Sync {
    fn start_agent_execute(&self, ctx: &TraceContext, name: &str) -> TraceContext {
        self.start(ctx, SpanKind::AgentExecute, name)
    }
    fn end_agent_execute(&self, ctx: &TraceContext, status: SpanStatus, error: Option<&str>) {
        self.end(ctx, status, error, None)
    }

    fn start_llm_call(&self, ctx: &TraceContext, name: &str) -> TraceContext {
        self.start(ctx, SpanKind::LlmCall, name)
    }
    fn end_llm_call(&self, ctx: &TraceContext, detail: Value, status: SpanStatus, error: Option<&str>) {
        self.end(ctx, status, error, Some(("llm_call", detail)))
    }

    fn start_tool_exec(&self, ctx: &TraceContext, name: &str) -> TraceContext {
        self.start(ctx, SpanKind::ToolExec, name)
    }
    fn end_tool_exec(&self, ctx: &TraceContext, detail: Value, status: SpanStatus, error: Option<&str>) {
        self.end(ctx, status, error, Some(("tool_exec", detail)))
    }

    fn start_sub_agent(&self, ctx: &TraceContext, name: &str) -> TraceContext {
        self.start(ctx, SpanKind::SubAgent, name)
    }
    fn end_sub_agent(&self, ctx: &TraceContext, status: SpanStatus, error: Option<&str>) {
        self.end(ctx, status, error, None)
    }

    /// Append a zero-duration event span under the context's current span.
    fn add_event(&self, ctx: &TraceContext, kind: &str, data: Value);

    /// Flush/persist the trace. Aggregates inner errors for `Multi`.
    async fn finish(&self, ctx: &TraceContext) -> Result<()>;

    // Internal primitives every Start*/End* wrapper funnels through. Exposed
    // so `Multi` can fan them out without re-implementing the per-kind
    // wrappers.
    #[doc(hidden)]
    fn start(&self, ctx: &TraceContext, kind: SpanKind, name: &str) -> TraceContext;
    #[doc(hidden)]
    fn end(
        &self,
        ctx: &TraceContext,
        status: SpanStatus,
        error: Option<&str>,
        detail: Option<(&str, Value)>,
    );
}

// ============================================================================
// RECORDER
// ============================================================================

/// In-memory span-tree recorder. Assigns a UUIDv7 trace id (unless
/// overridden) and UUIDv4 span ids, and is safe for concurrent
/// `Start*`/`End*`/`AddEvent` behind a single mutex guarding the tree.
pub struct Recorder {
    state: Mutex<RecorderState>,
    repository: Option<std::sync::Arc<dyn TraceRepository>>,
}

struct RecorderState {
    root: Option<Span>,
    trace_id: Option<Uuid>,
    model: Option<String>,
    strategy: Option<String>,
    labels: Value,
    started_at: Option<i64>,
    ended_at: Option<i64>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder {
            state: Mutex::new(RecorderState {
                root: None,
                trace_id: None,
                model: None,
                strategy: None,
                labels: Value::Object(Default::default()),
                started_at: None,
                ended_at: None,
            }),
            repository: None,
        }
    }

    pub fn with_repository(repository: std::sync::Arc<dyn TraceRepository>) -> Self {
        let mut r = Self::new();
        r.repository = Some(repository);
        r
    }

    /// A fresh root context with a new UUIDv7 trace id.
    pub fn new_trace(&self) -> TraceContext {
        TraceContext::root(Uuid::now_v7())
    }

    pub fn set_metadata(&self, model: impl Into<String>, strategy: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.model = Some(model.into());
        state.strategy = Some(strategy.into());
    }

    /// Serialize the recorded tree to the wire `Trace` JSON format.
    pub fn to_trace_json(&self) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let root = state.root.as_ref()?;
        Some(serde_json::json!({
            "trace_id": state.trace_id,
            "root_span": root,
            "metadata": {
                "model": state.model,
                "strategy": state.strategy,
                "labels": state.labels,
            },
            "started_at": state.started_at,
            "ended_at": state.ended_at,
        }))
    }

    pub fn span_tree(&self) -> Option<Span> {
        self.state.lock().unwrap().root.clone()
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Recorder {
    fn add_event(&self, ctx: &TraceContext, kind: &str, data: Value) {
        let current = match &ctx.inner {
            ContextInner::Single { current: Some(c), .. } => *c,
            _ => return,
        };
        let mut state = self.state.lock().unwrap();
        let Some(root) = state.root.as_mut() else {
            return;
        };
        let Some(parent) = root.find_mut(current) else {
            return;
        };
        let mut event = Span::new(Uuid::new_v4(), Some(current), SpanKind::Event, kind);
        event.ended_at = event.started_at.into();
        event.duration_ms = Some(0);
        event.event = Some(data);
        parent.children.push(event);
    }

    async fn finish(&self, ctx: &TraceContext) -> Result<()> {
        if ctx.is_disabled() {
            return Ok(());
        }
        let json = {
            let mut state = self.state.lock().unwrap();
            if state.ended_at.is_none() {
                state.ended_at = Some(now_millis());
            }
            self.to_trace_json()
        };
        if let (Some(repo), Some(json)) = (&self.repository, json) {
            let trace_id = self
                .state
                .lock()
                .unwrap()
                .trace_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            repo.save(&trace_id, json).await?;
        }
        Ok(())
    }

    fn start(&self, ctx: &TraceContext, kind: SpanKind, name: &str) -> TraceContext {
        match &ctx.inner {
            ContextInner::Disabled => ctx.clone(),
            ContextInner::Multi(_) => ctx.clone(),
            ContextInner::Single { trace_id, current } => {
                let mut state = self.state.lock().unwrap();
                let span_id = Uuid::new_v4();
                let new_span = Span::new(span_id, *current, kind, name);

                match current {
                    None => {
                        state.trace_id = Some(*trace_id);
                        if state.started_at.is_none() {
                            state.started_at = Some(new_span.started_at);
                        }
                        state.root = Some(new_span);
                    }
                    Some(parent_id) => {
                        let Some(root) = state.root.as_mut() else {
                            return ctx.clone();
                        };
                        match root.find_mut(*parent_id) {
                            Some(parent) => parent.children.push(new_span),
                            None => return ctx.clone(),
                        }
                    }
                }

                TraceContext {
                    inner: ContextInner::Single {
                        trace_id: *trace_id,
                        current: Some(span_id),
                    },
                }
            }
        }
    }

    fn end(
        &self,
        ctx: &TraceContext,
        status: SpanStatus,
        error: Option<&str>,
        detail: Option<(&str, Value)>,
    ) {
        let current = match &ctx.inner {
            ContextInner::Single { current: Some(c), .. } => *c,
            _ => return,
        };
        let mut state = self.state.lock().unwrap();
        let Some(root) = state.root.as_mut() else {
            return;
        };
        let Some(span) = root.find_mut(current) else {
            return;
        };
        let ended = now_millis();
        span.ended_at = Some(ended);
        span.duration_ms = Some(ended - span.started_at);
        span.status = status;
        span.error = error.map(|s| s.to_string());
        if let Some((field, value)) = detail {
            match field {
                "llm_call" => span.llm_call = Some(value),
                "tool_exec" => span.tool_exec = Some(value),
                _ => {}
            }
        }
    }
}

// ============================================================================
// MULTI HANDLER
// ============================================================================

/// Fans out every call to N inner handlers, keeping each one's current-span
/// pointer isolated inside the outer context's `Multi` variant.
pub struct Multi {
    handlers: Vec<std::sync::Arc<dyn Handler>>,
}

impl Multi {
    pub fn new(handlers: Vec<std::sync::Arc<dyn Handler>>) -> Self {
        Multi { handlers }
    }

    fn sub_contexts<'a>(&self, ctx: &'a TraceContext) -> Vec<TraceContext> {
        match &ctx.inner {
            ContextInner::Multi(v) => v.clone(),
            ContextInner::Disabled => {
                vec![TraceContext::disabled(); self.handlers.len()]
            }
            ContextInner::Single { .. } => {
                vec![ctx.clone(); self.handlers.len()]
            }
        }
    }
}

#[async_trait]
impl Handler for Multi {
    fn add_event(&self, ctx: &TraceContext, kind: &str, data: Value) {
        let subs = self.sub_contexts(ctx);
        for (h, sub) in self.handlers.iter().zip(subs.iter()) {
            h.add_event(sub, kind, data.clone());
        }
    }

    async fn finish(&self, ctx: &TraceContext) -> Result<()> {
        let subs = self.sub_contexts(ctx);
        let mut errors = Vec::new();
        for (h, sub) in self.handlers.iter().zip(subs.iter()) {
            if let Err(e) = h.finish(sub).await {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::other(errors.join("; ")))
        }
    }

    fn start(&self, ctx: &TraceContext, kind: SpanKind, name: &str) -> TraceContext {
        let subs = self.sub_contexts(ctx);
        let new_subs = self
            .handlers
            .iter()
            .zip(subs.iter())
            .map(|(h, sub)| h.start(sub, kind, name))
            .collect();
        TraceContext::multi(new_subs)
    }

    fn end(
        &self,
        ctx: &TraceContext,
        status: SpanStatus,
        error: Option<&str>,
        detail: Option<(&str, Value)>,
    ) {
        let subs = self.sub_contexts(ctx);
        for (h, sub) in self.handlers.iter().zip(subs.iter()) {
            h.end(sub, status, error, detail.clone());
        }
    }
}

/// A `Handler` with every method a no-op, for callers that don't want
/// tracing overhead.
#[derive(Debug, Default)]
pub struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    fn add_event(&self, _ctx: &TraceContext, _kind: &str, _data: Value) {}
    async fn finish(&self, _ctx: &TraceContext) -> Result<()> {
        Ok(())
    }
    fn start(&self, ctx: &TraceContext, _kind: SpanKind, _name: &str) -> TraceContext {
        ctx.clone()
    }
    fn end(&self, _ctx: &TraceContext, _status: SpanStatus, _error: Option<&str>, _detail: Option<(&str, Value)>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_single_span_well_formed() {
        let recorder = Recorder::new();
        let root_ctx = recorder.new_trace();
        let ctx = recorder.start_agent_execute(&root_ctx, "execute");
        recorder.end_agent_execute(&ctx, SpanStatus::Ok, None);
        let tree = recorder.span_tree().unwrap();
        assert!(tree.is_well_formed());
        assert_eq!(tree.kind, SpanKind::AgentExecute);
        assert!(tree.ended_at.is_some());
    }

    #[test]
    fn test_nested_spans_ordered_under_parent() {
        let recorder = Recorder::new();
        let root_ctx = recorder.new_trace();
        let agent_ctx = recorder.start_agent_execute(&root_ctx, "execute");
        let llm_ctx = recorder.start_llm_call(&agent_ctx, "turn 1");
        recorder.end_llm_call(&llm_ctx, serde_json::json!({"model": "m"}), SpanStatus::Ok, None);
        let tool_ctx = recorder.start_tool_exec(&agent_ctx, "add");
        recorder.end_tool_exec(&tool_ctx, serde_json::json!({"tool": "add"}), SpanStatus::Ok, None);
        recorder.end_agent_execute(&agent_ctx, SpanStatus::Ok, None);

        let tree = recorder.span_tree().unwrap();
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].kind, SpanKind::LlmCall);
        assert_eq!(tree.children[1].kind, SpanKind::ToolExec);
        assert!(tree.is_well_formed());
    }

    #[test]
    fn test_start_no_op_without_current_span_property_9() {
        let recorder = Recorder::new();
        let disabled = TraceContext::disabled();
        let ctx = recorder.start_agent_execute(&disabled, "execute");
        assert!(ctx.is_disabled());
        assert!(recorder.span_tree().is_none());
    }

    #[test]
    fn test_add_event_zero_duration() {
        let recorder = Recorder::new();
        let root_ctx = recorder.new_trace();
        let ctx = recorder.start_agent_execute(&root_ctx, "execute");
        recorder.add_event(&ctx, "plan_created", serde_json::json!({"tasks": 2}));
        recorder.end_agent_execute(&ctx, SpanStatus::Ok, None);

        let tree = recorder.span_tree().unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].kind, SpanKind::Event);
        assert_eq!(tree.children[0].duration_ms, Some(0));
    }

    #[test]
    fn test_multi_handler_isolation_property_10() {
        let rec1 = Arc::new(Recorder::new());
        let rec2 = Arc::new(Recorder::new());
        let multi = Multi::new(vec![rec1.clone(), rec2.clone()]);

        let root_ctx = TraceContext::root(Uuid::now_v7());
        let root_ctx = multi.start(&root_ctx, SpanKind::AgentExecute, "execute");
        let llm_ctx = multi.start(&root_ctx, SpanKind::LlmCall, "turn 1");
        multi.end(&llm_ctx, SpanStatus::Ok, None, None);
        multi.end(&root_ctx, SpanStatus::Ok, None, None);

        let tree1 = rec1.span_tree().unwrap();
        let tree2 = rec2.span_tree().unwrap();
        assert_eq!(tree1.children.len(), tree2.children.len());
        assert_eq!(tree1.children[0].kind, tree2.children[0].kind);
    }
}
