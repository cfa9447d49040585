//! Lifecycle hooks.
//!
//! Hooks run synchronously on the executor's control thread; a hook
//! returning an error aborts the execution with that error, wrapped as
//! `Error::Hook`. Generalizes the teacher's `Hooks`/`HookDecision`
//! pre/post-tool-use events to the full hook set the executor and
//! plan-and-execute strategy raise.

use crate::error::Result;
use crate::history::History;
use crate::value::FunctionCall;
use serde_json::Value;

/// Event delivered before a tool call is dispatched.
pub struct ToolRequestEvent<'a> {
    pub call: &'a FunctionCall,
    pub history: &'a History,
}

/// Event delivered after a tool call completes successfully.
pub struct ToolResponseEvent<'a> {
    pub call: &'a FunctionCall,
    pub result: &'a Value,
    pub history: &'a History,
}

/// Event delivered after a tool call fails.
pub struct ToolErrorEvent<'a> {
    pub call: &'a FunctionCall,
    pub error: &'a str,
    pub history: &'a History,
}

/// Event delivered once per assistant text segment produced in a turn.
pub struct MessageEvent<'a> {
    pub text: &'a str,
    pub history: &'a History,
}

/// Event delivered around history compaction.
pub struct CompactionEvent<'a> {
    pub original: &'a History,
    pub compacted: &'a History,
}

/// Lifecycle hooks an `Agent` invokes during `Execute`. All methods default
/// to no-ops; implement only what you need. Returning `Err` from any hook
/// aborts the execution with that error.
pub trait Hooks: Send + Sync {
    fn on_message(&self, _event: MessageEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn on_tool_request(&self, _event: ToolRequestEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn on_tool_response(&self, _event: ToolResponseEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn on_tool_error(&self, _event: ToolErrorEvent<'_>) -> Result<()> {
        Ok(())
    }

    fn on_compaction(&self, _event: CompactionEvent<'_>) -> Result<()> {
        Ok(())
    }
}

/// A `Hooks` implementation with every callback a no-op, used as the
/// executor's default when a caller doesn't supply one.
#[derive(Default)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        messages: AtomicUsize,
    }

    impl Hooks for CountingHooks {
        fn on_message(&self, _event: MessageEvent<'_>) -> Result<()> {
            self.messages.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_hooks_default_noop() {
        let hooks = NoopHooks;
        let history = History::new("test");
        assert!(hooks
            .on_message(MessageEvent {
                text: "hi",
                history: &history,
            })
            .is_ok());
    }

    #[test]
    fn test_custom_hook_runs() {
        let hooks = CountingHooks {
            messages: AtomicUsize::new(0),
        };
        let history = History::new("test");
        hooks
            .on_message(MessageEvent {
                text: "hi",
                history: &history,
            })
            .unwrap();
        assert_eq!(hooks.messages.load(Ordering::SeqCst), 1);
    }
}
