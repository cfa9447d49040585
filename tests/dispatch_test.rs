//! Tool dispatch through the public API: hook vetoes and tool-set conflicts.

use agent_core::dispatch::dispatch_calls;
use agent_core::error::Error;
use agent_core::history::History;
use agent_core::hooks::{Hooks, ToolRequestEvent};
use agent_core::tool;
use agent_core::tools::ToolRegistry;
use agent_core::value::FunctionCall;
use tokio_util::sync::CancellationToken;

struct VetoingHooks;

impl Hooks for VetoingHooks {
    fn on_tool_request(&self, event: ToolRequestEvent<'_>) -> agent_core::error::Result<()> {
        if event.call.name == "dangerous" {
            return Err(Error::hook("dangerous tool blocked"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_hook_veto_aborts_dispatch_before_any_tool_runs() {
    let dangerous = tool("dangerous", "does something risky")
        .handler(|_args| async move { Ok(serde_json::json!({})) })
        .unwrap();
    let registry = ToolRegistry::build(vec![dangerous], vec![]).await.unwrap();

    let calls = vec![FunctionCall {
        id: "1".into(),
        name: "dangerous".into(),
        arguments: serde_json::Map::new(),
    }];
    let hooks = VetoingHooks;
    let history = History::new("agent");
    let cancel = CancellationToken::new();

    let err = dispatch_calls(&registry, &calls, &hooks, &history, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Hook(_)));
}

#[tokio::test]
async fn test_unknown_tool_call_surfaces_as_function_response_error() {
    let registry = ToolRegistry::build(vec![], vec![]).await.unwrap();
    let calls = vec![FunctionCall {
        id: "1".into(),
        name: "nonexistent".into(),
        arguments: serde_json::Map::new(),
    }];
    let hooks = agent_core::hooks::NoopHooks;
    let history = History::new("agent");
    let cancel = CancellationToken::new();

    let responses = dispatch_calls(&registry, &calls, &hooks, &history, &cancel)
        .await
        .unwrap();
    match &responses[0] {
        agent_core::value::Input::FunctionResponse { error, .. } => assert!(error.is_some()),
        _ => panic!("expected function response"),
    }
}
