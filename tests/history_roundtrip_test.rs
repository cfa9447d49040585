//! History serialization and repository round-trips.

use agent_core::history::{History, Message, Role};
use agent_core::repository::{HistoryRepository, InMemoryHistoryRepository};
use agent_core::value::FunctionCall;

#[test]
fn test_history_round_trips_through_json_with_tool_calls() {
    let mut history = History::new("agent");
    history.push(Message::system("Be concise."));
    history.push(Message::user("Add 5 and 3"));
    let call = FunctionCall {
        id: "call_1".into(),
        name: "add".into(),
        arguments: serde_json::Map::new(),
    };
    history.push(Message::assistant_tool_calls(&[call]));
    history.push(Message::tool_response(
        "call_1",
        "add",
        serde_json::json!({"result": 8}),
        false,
    ));
    history.push(Message::assistant_text("The result is 8."));
    assert!(history.validate_tool_call_pairing().is_ok());

    let json = serde_json::to_string(&history).unwrap();
    let restored: History = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.messages.len(), history.messages.len());
    assert_eq!(restored.ll_type, "agent");
    assert!(restored.validate_tool_call_pairing().is_ok());
}

#[test]
fn test_system_merge_preserves_order_for_providers_without_system_role() {
    let mut history = History::new("agent");
    history.push(Message::system("You are terse."));
    history.push(Message::user("Hello"));
    history.push(Message::assistant_text("Hi."));

    let merged = history.with_system_merged_into_user();
    assert_eq!(merged.messages.len(), 2);
    assert_eq!(merged.messages[0].role, Role::User);
}

#[tokio::test]
async fn test_history_repository_persists_across_save_and_load() {
    let repo = InMemoryHistoryRepository::new();
    let mut history = History::new("agent");
    history.push(Message::user("remember this"));
    repo.save("session-1", &history).await.unwrap();

    let loaded = repo.load("session-1").await.unwrap().unwrap();
    assert_eq!(loaded.messages.len(), 1);
    assert!(repo.load("session-2").await.unwrap().is_none());
}
