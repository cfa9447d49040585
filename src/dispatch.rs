//! Parallel tool dispatch (§4.3).
//!
//! All calls in one assistant turn are dispatched concurrently — one Tokio
//! task per call, no additional throttling — and reassembled back into the
//! original call order before being handed to the LLM, so conversation
//! history stays deterministic regardless of completion order. Grounded on
//! the `futures::future::join_all`-over-per-call-futures idiom used
//! throughout the pack's own tool-dispatch loops.

use crate::error::Result;
use crate::hooks::{Hooks, ToolErrorEvent, ToolRequestEvent, ToolResponseEvent};
use crate::history::History;
use crate::tools::ToolRegistry;
use crate::value::{FunctionCall, Input};
use futures::future::join_all;
use log::{debug, warn};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Dispatch every call in `calls` concurrently against `registry`, honoring
/// `cancel`. Returns one `Input::FunctionResponse` per call, in the same
/// order as `calls`, regardless of completion order.
///
/// Per-call tool failures are captured in the returned `FunctionResponse`'s
/// `error` field and never abort the batch. A hook failure (request or
/// response/error hook) does abort the whole dispatch and is propagated as
/// `Err`.
pub async fn dispatch_calls(
    registry: &ToolRegistry,
    calls: &[FunctionCall],
    hooks: &dyn Hooks,
    history: &History,
    cancel: &CancellationToken,
) -> Result<Vec<Input>> {
    // Pre-dispatch hooks run synchronously, in call order, before any tool
    // starts running, so a hook can veto a call it hasn't fired a task for
    // yet by returning Err.
    for call in calls {
        if let Err(e) = hooks.on_tool_request(ToolRequestEvent { call, history }) {
            warn!("tool request hook vetoed call '{}' ({}): {e}", call.name, call.id);
            return Err(e);
        }
    }

    let futures = calls.iter().map(|call| async {
        if cancel.is_cancelled() {
            return (call.clone(), Err(crate::error::Error::Cancelled));
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(crate::error::Error::Cancelled),
            r = registry.run(&call.name, call.arguments.clone()) => r,
        };
        (call.clone(), result)
    });

    let outcomes = join_all(futures).await;

    let mut responses = Vec::with_capacity(outcomes.len());
    for (call, outcome) in outcomes {
        if cancel.is_cancelled() {
            return Err(crate::error::Error::Cancelled);
        }
        match outcome {
            Ok(value) => {
                hooks.on_tool_response(ToolResponseEvent {
                    call: &call,
                    result: &value,
                    history,
                })?;
                responses.push(Input::function_response(
                    call.id.clone(),
                    call.name.clone(),
                    value,
                    None,
                ));
            }
            Err(e) => {
                let message = e.to_string();
                debug!("tool '{}' ({}) failed: {message}", call.name, call.id);
                hooks.on_tool_error(ToolErrorEvent {
                    call: &call,
                    error: &message,
                    history,
                })?;
                responses.push(Input::function_response(
                    call.id.clone(),
                    call.name.clone(),
                    Value::Null,
                    Some(message),
                ));
            }
        }
    }

    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use crate::tools::{tool, ToolRegistry};
    use crate::value::{Parameter, ParameterType};
    use std::time::Duration;

    fn ordering_registry() -> ToolRegistry {
        let slow = tool("slow", "sleeps then returns 'slow'")
            .param("ms", Parameter::new(ParameterType::Integer), true)
            .handler(|args| async move {
                let ms = args.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(serde_json::json!({ "slept_ms": ms }))
            })
            .unwrap();
        let fails = tool("fails", "always errors")
            .handler(|_args| async move { Err(crate::error::Error::tool("boom")) })
            .unwrap();
        futures::executor::block_on(ToolRegistry::build(vec![slow, fails], vec![])).unwrap()
    }

    fn call(id: &str, name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order_regardless_of_completion_order() {
        let registry = ordering_registry();
        let calls = vec![
            call("1", "slow", serde_json::json!({"ms": 30})),
            call("2", "slow", serde_json::json!({"ms": 1})),
        ];
        let hooks = NoopHooks;
        let history = History::new("test");
        let cancel = CancellationToken::new();
        let responses = dispatch_calls(&registry, &calls, &hooks, &history, &cancel)
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);
        match &responses[0] {
            Input::FunctionResponse { id, .. } => assert_eq!(id, "1"),
            _ => panic!("expected function response"),
        }
        match &responses[1] {
            Input::FunctionResponse { id, .. } => assert_eq!(id, "2"),
            _ => panic!("expected function response"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_per_call_failure_does_not_abort_batch() {
        let registry = ordering_registry();
        let calls = vec![
            call("1", "fails", serde_json::json!({})),
            call("2", "slow", serde_json::json!({"ms": 1})),
        ];
        let hooks = NoopHooks;
        let history = History::new("test");
        let cancel = CancellationToken::new();
        let responses = dispatch_calls(&registry, &calls, &hooks, &history, &cancel)
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);
        match &responses[0] {
            Input::FunctionResponse { error, .. } => assert!(error.is_some()),
            _ => panic!("expected function response"),
        }
        match &responses[1] {
            Input::FunctionResponse { error, .. } => assert!(error.is_none()),
            _ => panic!("expected function response"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_cancellation_s6() {
        let registry = ordering_registry();
        let calls = vec![
            call("1", "slow", serde_json::json!({"ms": 5000})),
            call("2", "slow", serde_json::json!({"ms": 5000})),
        ];
        let hooks = NoopHooks;
        let history = History::new("test");
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            dispatch_calls(&registry, &calls, &hooks, &history, &cancel),
        )
        .await
        .expect("dispatch should return promptly after cancellation");
        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }
}
