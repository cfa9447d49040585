//! Provider-scoped turn handler.
//!
//! A `Session` wraps one model's conversation: it accepts `Input`s, issues a
//! single provider call, and returns the aggregated `Response`. The concrete
//! provider integration (an `LLMClient` implementation, e.g. for OpenAI,
//! Anthropic, or a local server) is out of scope here — this module owns the
//! trait boundary and the reference in-memory bookkeeping every concrete
//! session needs regardless of provider.

use crate::error::{Error, Result};
use crate::history::{History, Message, MessageContent, Role};
use crate::value::{Input, Response, Tool};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// Whether a session should ask the provider for free-form text or a
/// constrained JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Text,
    Json,
}

/// Request/response interception hooks a caller can attach to a session.
/// Both methods default to no-ops so a middleware only needs to override
/// what it cares about.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn on_request(&self, _inputs: &mut Vec<Input>) -> Result<()> {
        Ok(())
    }

    async fn on_response(&self, _response: &mut Response) -> Result<()> {
        Ok(())
    }
}

/// Options recognized by `LLMClient::new_session`.
#[derive(Default)]
pub struct SessionOptions {
    pub tools: Vec<Arc<dyn Tool>>,
    pub system_prompt: Option<String>,
    pub history: Option<History>,
    pub content_type: ContentType,
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// A provider-bound conversation turn.
///
/// When `content_type` is `Json`, the session must instruct the provider to
/// emit a JSON object and must not pass any tools, since some providers
/// prioritize function calls over text under JSON mode.
#[async_trait]
pub trait Session: Send {
    /// Append `inputs` to the internal message log, issue one provider call,
    /// and return the aggregated response.
    async fn generate_content(&mut self, inputs: Vec<Input>) -> Result<Response>;

    /// Like `generate_content`, but as a stream of partial `Response`
    /// deltas, with a final element carrying the fully accumulated tool
    /// calls and token totals. The internal message log is updated exactly
    /// once, after the stream terminates.
    async fn generate_stream(
        &mut self,
        inputs: Vec<Input>,
    ) -> Result<Pin<Box<dyn Stream<Item = Response> + Send>>>;

    /// A snapshot of this session's history, round-trippable through the
    /// owning provider's codec.
    fn history(&self) -> History;
}

/// What a concrete provider integration must implement. Out of scope for
/// this crate's core — only the trait boundary is specified.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn new_session(&self, options: SessionOptions) -> Result<Box<dyn Session>>;

    async fn count_tokens(&self, history: &History) -> Result<u32>;

    fn is_compatible_history(&self, history: &History) -> Result<()>;

    /// Optional embedding capability; not used by the core. Implementations
    /// that don't support it should keep the default, which reports an
    /// unsupported-operation error.
    async fn generate_embedding(&self, _dim: usize, _inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(Error::other("embedding generation not supported"))
    }
}

// ============================================================================
// REFERENCE SESSION ACCUMULATION HELPERS
// ============================================================================
//
// A concrete `LLMClient`/`Session` pair (out of scope) still needs a place to
// accumulate streaming tool-call deltas by index and commit the turn to
// history exactly once. These helpers capture that bookkeeping so a provider
// integration only has to supply the wire-level streaming parse.

/// Accumulates streaming deltas for a single turn: growing text and
/// per-index tool-call fragments, committed to `Response`/`Message` only
/// once the stream signals completion.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: Vec<PartialToolCall>,
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments_json: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text_delta(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Merge a tool-call delta at `index`, growing the accumulator's
    /// tool-call list as needed. Mirrors the by-index accumulation idiom
    /// providers use for incremental function-call streaming.
    pub fn push_tool_call_delta(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments_delta: Option<&str>,
    ) {
        if self.tool_calls.len() <= index {
            self.tool_calls.resize(index + 1, PartialToolCall::default());
        }
        let slot = &mut self.tool_calls[index];
        if let Some(id) = id {
            slot.id = id.to_string();
        }
        if let Some(name) = name {
            slot.name = name.to_string();
        }
        if let Some(delta) = arguments_delta {
            slot.arguments_json.push_str(delta);
        }
    }

    pub fn set_tokens(&mut self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
    }

    /// Finalize into a `Response`, parsing each accumulated tool call's
    /// argument JSON. A tool call with unparseable arguments surfaces as
    /// `InvalidParameter` rather than silently dropping the call.
    pub fn finish(self) -> Result<Response> {
        let mut function_calls = Vec::with_capacity(self.tool_calls.len());
        for call in self.tool_calls {
            if call.id.is_empty() && call.name.is_empty() {
                continue;
            }
            let arguments = if call.arguments_json.trim().is_empty() {
                serde_json::Map::new()
            } else {
                serde_json::from_str(&call.arguments_json).map_err(|e| {
                    Error::invalid_parameter(format!(
                        "tool call '{}' has malformed arguments: {e}",
                        call.name
                    ))
                })?
            };
            function_calls.push(crate::value::FunctionCall {
                id: call.id,
                name: call.name,
                arguments,
            });
        }
        let texts = if self.text.is_empty() {
            Vec::new()
        } else {
            vec![self.text]
        };
        Ok(Response {
            texts,
            function_calls,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            error: None,
        })
    }
}

/// Build the bounded-channel producer/consumer pair a thread-concurrent
/// `Session::generate_stream` implementation uses: a `Stream<Item=Response>`
/// for the caller, and a sender a background task feeds partial deltas into.
pub fn stream_channel(
    buffer: usize,
) -> (
    tokio::sync::mpsc::Sender<Response>,
    Pin<Box<dyn Stream<Item = Response> + Send>>,
) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    (tx, Box::pin(ReceiverStream::new(rx)))
}

/// Commit one assistant turn (texts + a single tool-call message if any) to
/// `history`, mirroring the "one assistant message per turn, not per call"
/// rule from §4.1.
pub fn commit_turn(history: &mut History, response: &Response) {
    for text in &response.texts {
        history.push(Message::assistant_text(text.clone()));
    }
    if !response.function_calls.is_empty() {
        history.push(Message::assistant_tool_calls(&response.function_calls));
    }
}

/// Render a message-history slice suitable for a provider that requires all
/// prior tool calls visible (used by reflection/planning sessions that
/// reuse the executor's history without re-issuing tool calls).
pub fn visible_tool_call_names(history: &History) -> Vec<&str> {
    history
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| {
            m.contents.iter().filter_map(|c| match c {
                MessageContent::ToolCall { name, .. } => Some(name.as_str()),
                _ => None,
            })
        })
        .collect()
}
