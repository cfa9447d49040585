//! History compactor.
//!
//! Summarizes the prefix of a history when a provider's token count exceeds
//! budget, while preserving a byte-identical recent suffix and never
//! splitting a tool-call/tool-response pair across the compaction boundary.
//!
//! Supersedes the repository's older "compression strategies" (truncate,
//! hybrid) per the design notes — this is the only history-shrinking
//! mechanism the core ships.

use crate::error::Result;
use crate::history::{History, Message, Role};
use crate::session::LLMClient;
use std::sync::Arc;

/// Compactor configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompactorConfig {
    pub max_tokens: u32,
    pub preserve_recent_tokens: u32,
}

/// Summarizes history prefixes via the provider's own `LLMClient`, using a
/// per-message token-count function supplied by the caller (in production,
/// this wraps `LLMClient::count_tokens` one message at a time; tests supply
/// a deterministic stub).
pub struct Compactor {
    config: CompactorConfig,
}

impl Compactor {
    pub fn new(config: CompactorConfig) -> Self {
        Compactor { config }
    }

    /// True if `history` exceeds the configured token budget and should be
    /// compacted before the next iteration.
    pub async fn should_compact(&self, client: &dyn LLMClient, history: &History) -> Result<bool> {
        let tokens = client.count_tokens(history).await?;
        Ok(tokens > self.config.max_tokens)
    }

    /// Run the compaction algorithm (§4.9):
    /// 1. Walk messages from the tail, accumulating per-message token counts
    ///    until `preserve_recent_tokens` is reached — these are preserved.
    /// 2. Never split a tool-call/tool-response pair across the boundary:
    ///    if a preserved tool-call's response falls in the prefix, or vice
    ///    versa, the boundary is pulled to include the whole pair.
    /// 3. Ask the LLM (via `summarize`) to summarize the prefix into a
    ///    single assistant-role text; that becomes message 0.
    /// 4. Build the new history and fire the caller's `on_compacted` hook
    ///    with `(original, new)` before returning.
    pub async fn compact<F, Fut>(
        &self,
        history: &History,
        token_count_fn: impl Fn(&Message) -> u32,
        summarize: F,
    ) -> Result<History>
    where
        F: FnOnce(Vec<Message>) -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let original_len = history.messages.len();
        let boundary = self.compute_boundary(history, token_count_fn);

        let prefix: Vec<Message> = history.messages[..boundary].to_vec();
        let preserved: Vec<Message> = history.messages[boundary..].to_vec();

        let summary_text = if prefix.is_empty() {
            String::new()
        } else {
            summarize(prefix).await?
        };

        let mut new_history = History {
            ll_type: history.ll_type.clone(),
            version: history.version,
            messages: Vec::with_capacity(preserved.len() + 1),
            summary: Some(summary_text.clone()),
            original_len: Some(original_len),
            compacted: true,
        };
        if !summary_text.is_empty() {
            new_history.push(Message::assistant_text(summary_text));
        }
        new_history.messages.extend(preserved);

        Ok(new_history)
    }

    /// Compute the index at which the preserved suffix begins, pulled
    /// leftwards as needed so no tool-call/tool-response pair straddles the
    /// boundary.
    fn compute_boundary(&self, history: &History, token_count_fn: impl Fn(&Message) -> u32) -> usize {
        let n = history.messages.len();
        let mut acc = 0u32;
        let mut boundary = n;
        for i in (0..n).rev() {
            if acc >= self.config.preserve_recent_tokens {
                break;
            }
            acc += token_count_fn(&history.messages[i]);
            boundary = i;
        }

        // Pull the boundary left until no tool-call/response pair is split.
        loop {
            let prefix_call_ids: Vec<&str> = history.messages[..boundary]
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .flat_map(|m| m.all_tool_call_ids())
                .collect();
            let suffix_response_ids: Vec<&str> = history.messages[boundary..]
                .iter()
                .filter(|m| matches!(m.role, Role::Tool | Role::Function))
                .flat_map(|m| m.all_tool_response_ids())
                .collect();

            let splits_forward = prefix_call_ids
                .iter()
                .any(|id| suffix_response_ids.contains(id));

            let suffix_call_ids: Vec<&str> = history.messages[boundary..]
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .flat_map(|m| m.all_tool_call_ids())
                .collect();
            let prefix_response_ids: Vec<&str> = history.messages[..boundary]
                .iter()
                .filter(|m| matches!(m.role, Role::Tool | Role::Function))
                .flat_map(|m| m.all_tool_response_ids())
                .collect();
            let splits_backward = suffix_call_ids
                .iter()
                .any(|id| prefix_response_ids.contains(id));

            if (splits_forward || splits_backward) && boundary > 0 {
                boundary -= 1;
                continue;
            }
            break;
        }
        boundary
    }
}

/// Hook signature invoked before/after compaction, per §4.2's hook list.
pub type CompactionHook = Arc<dyn Fn(&History, &History) + Send + Sync>;

/// Character-count token estimate for one message, ~1 token per 4
/// characters — the same rough heuristic the teacher's context-management
/// module uses when no provider-supplied tokenizer is available. Callers
/// that have a real `LLMClient::count_tokens` should prefer that; this is
/// the fallback `Compactor::compact` can always fall back on.
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let chars: usize = message
        .contents
        .iter()
        .map(|c| match c {
            crate::history::MessageContent::Text(t) => t.len(),
            crate::history::MessageContent::ToolCall { name, arguments, .. } => {
                name.len() + serde_json::to_string(arguments).map(|s| s.len()).unwrap_or(0)
            }
            crate::history::MessageContent::ToolResponse { response, .. } => {
                serde_json::to_string(response).map(|s| s.len()).unwrap_or(0)
            }
            _ => 0,
        })
        .sum();
    ((chars as f64) / 4.0).ceil() as u32
}
