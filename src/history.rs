//! Provider-neutral conversation history.
//!
//! `History` is the canonical record of a conversation: every message sent
//! to or received from a provider, encoded in a shape no particular provider
//! owns. A concrete `LLMClient` converts it to and from its own wire format;
//! this module only owns the neutral representation, the `{Type,Data}`
//! content envelope used for portable storage, and the system-prompt merge
//! rule providers without a `system` role need.

use crate::error::{Error, Result};
use crate::value::{FunctionCall, ImageDetail, ImageInput, Input, PdfInput};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current history schema version. Bump on any breaking change; a provider's
/// `is_compatible_history` check refuses histories from a newer version than
/// it understands.
pub const HISTORY_VERSION: u32 = 1;

/// The participant role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Function,
    Model,
}

/// One piece of content within a message. Tagged so it encodes portably as
/// `{Type, Data}` regardless of which provider family produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Image {
        media_type: Option<String>,
        url: Option<String>,
        data: Option<Vec<u8>>,
        detail: ImageDetail,
    },
    Pdf {
        url: Option<String>,
        data: Option<Vec<u8>>,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Map<String, Value>,
    },
    ToolResponse {
        tool_call_id: String,
        name: String,
        response: Value,
        is_error: bool,
    },
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        MessageContent::Text(s.into())
    }

    /// True for an empty or whitespace-only text block; such blocks are
    /// still serialized (never silently dropped), this only flags them for
    /// callers that want to warn.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, MessageContent::Text(t) if t.trim().is_empty())
    }

    fn from_image(img: &ImageInput) -> Self {
        match img {
            ImageInput::Url { url, detail } => MessageContent::Image {
                media_type: None,
                url: Some(url.clone()),
                data: None,
                detail: *detail,
            },
            ImageInput::Bytes {
                media_type,
                data,
                detail,
            } => MessageContent::Image {
                media_type: Some(media_type.clone()),
                url: None,
                data: Some(data.clone()),
                detail: *detail,
            },
        }
    }

    fn from_pdf(pdf: &PdfInput) -> Self {
        match pdf {
            PdfInput::Url(url) => MessageContent::Pdf {
                url: Some(url.clone()),
                data: None,
            },
            PdfInput::Bytes(data) => MessageContent::Pdf {
                url: None,
                data: Some(data.clone()),
            },
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub contents: Vec<MessageContent>,
}

impl Message {
    pub fn new(role: Role, contents: Vec<MessageContent>) -> Self {
        Message {
            role,
            name: None,
            contents,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::new(Role::System, vec![MessageContent::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::new(Role::User, vec![MessageContent::text(text)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::new(Role::Assistant, vec![MessageContent::text(text)])
    }

    /// Build the single assistant message carrying every tool call from one
    /// turn. Per §4.1, a turn's tool calls are always a single message, not
    /// one message per call, since most providers require that shape.
    pub fn assistant_tool_calls(calls: &[FunctionCall]) -> Self {
        let contents = calls
            .iter()
            .map(|c| MessageContent::ToolCall {
                id: c.id.clone(),
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            })
            .collect();
        Message::new(Role::Assistant, contents)
    }

    pub fn tool_response(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        response: Value,
        is_error: bool,
    ) -> Self {
        Message::new(
            Role::Tool,
            vec![MessageContent::ToolResponse {
                tool_call_id: tool_call_id.into(),
                name: name.into(),
                response,
                is_error,
            }],
        )
    }

    /// Build a message from a caller-facing `Input`. Not used for
    /// `FunctionResponse`, which is rendered as a `Role::Tool` message
    /// instead (see `History::push_input`).
    fn from_input(role: Role, input: &Input) -> Option<Self> {
        let content = match input {
            Input::Text(t) => MessageContent::text(t),
            Input::Image(img) => MessageContent::from_image(img),
            Input::Pdf(pdf) => MessageContent::from_pdf(pdf),
            Input::FunctionResponse { .. } => return None,
        };
        Some(Message::new(role, vec![content]))
    }

    pub fn all_tool_call_ids(&self) -> Vec<&str> {
        self.contents
            .iter()
            .filter_map(|c| match c {
                MessageContent::ToolCall { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn all_tool_response_ids(&self) -> Vec<&str> {
        self.contents
            .iter()
            .filter_map(|c| match c {
                MessageContent::ToolResponse { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// The canonical, provider-neutral conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub ll_type: String,
    pub version: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_len: Option<usize>,
    pub compacted: bool,
}

impl History {
    pub fn new(ll_type: impl Into<String>) -> Self {
        History {
            ll_type: ll_type.into(),
            version: HISTORY_VERSION,
            messages: Vec::new(),
            summary: None,
            original_len: None,
            compacted: false,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a caller-supplied `Input` as a new message. `FunctionResponse`
    /// inputs become `Role::Tool` messages; everything else becomes a
    /// `Role::User` message (the role the executor uses when it forwards
    /// caller-facing inputs into the session).
    pub fn push_input(&mut self, input: &Input) {
        match input {
            Input::FunctionResponse {
                id,
                name,
                data,
                error,
            } => {
                let response = match error {
                    Some(e) => Value::String(e.clone()),
                    None => data.clone(),
                };
                self.push(Message::tool_response(
                    id.clone(),
                    name.clone(),
                    response,
                    error.is_some(),
                ));
            }
            other => {
                if let Some(msg) = Message::from_input(Role::User, other) {
                    self.push(msg);
                }
            }
        }
    }

    /// Merge consecutive `system` messages into the first `user` message's
    /// leading text for providers that don't support a dedicated system
    /// role, per the spec's system-prompt merging rule. Returns a new
    /// `History`; does not mutate `self`.
    pub fn with_system_merged_into_user(&self) -> History {
        let mut system_texts = Vec::new();
        let mut rest = Vec::new();
        let mut merged_already = false;

        for msg in &self.messages {
            if msg.role == Role::System && !merged_already {
                for c in &msg.contents {
                    if let MessageContent::Text(t) = c {
                        system_texts.push(t.clone());
                    }
                }
                continue;
            }
            rest.push(msg.clone());
        }

        if !system_texts.is_empty() {
            let prefix = system_texts.join("\n\n");
            if let Some(first_user) = rest.iter_mut().find(|m| m.role == Role::User) {
                if let Some(MessageContent::Text(t)) = first_user
                    .contents
                    .iter_mut()
                    .find(|c| matches!(c, MessageContent::Text(_)))
                {
                    *t = format!("{prefix}\n\n{t}");
                } else {
                    first_user
                        .contents
                        .insert(0, MessageContent::Text(prefix.clone()));
                }
                merged_already = true;
            } else {
                rest.insert(0, Message::user(prefix));
                merged_already = true;
            }
        }
        let _ = merged_already;

        History {
            ll_type: self.ll_type.clone(),
            version: self.version,
            messages: rest,
            summary: self.summary.clone(),
            original_len: self.original_len,
            compacted: self.compacted,
        }
    }

    /// Verify the tool-call/tool-response pairing invariant: every assistant
    /// message's tool-call ids have a matching downstream tool-response,
    /// appearing in order.
    pub fn validate_tool_call_pairing(&self) -> Result<()> {
        let mut pending: Vec<String> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::Assistant => {
                    for id in msg.all_tool_call_ids() {
                        pending.push(id.to_string());
                    }
                }
                Role::Tool | Role::Function => {
                    for id in msg.all_tool_response_ids() {
                        if let Some(pos) = pending.iter().position(|p| p == id) {
                            pending.remove(pos);
                        }
                    }
                }
                _ => {}
            }
        }
        if !pending.is_empty() {
            return Err(Error::invalid_parameter(format!(
                "unresolved tool calls without matching responses: {pending:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_len() {
        let mut h = History::new("test");
        h.push(Message::user("hi"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_tool_call_response_roundtrip_json() {
        let mut h = History::new("test");
        h.push(Message::user("add 5 and 3"));
        let call = FunctionCall {
            id: "call_1".into(),
            name: "add".into(),
            arguments: Map::new(),
        };
        h.push(Message::assistant_tool_calls(&[call]));
        h.push(Message::tool_response(
            "call_1",
            "add",
            serde_json::json!({"result": 8}),
            false,
        ));
        h.push(Message::assistant_text("The result is 8."));

        assert!(h.validate_tool_call_pairing().is_ok());

        let json = serde_json::to_string(&h).unwrap();
        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages.len(), h.messages.len());
        assert_eq!(back.ll_type, h.ll_type);
    }

    #[test]
    fn test_unresolved_tool_call_fails_validation() {
        let mut h = History::new("test");
        let call = FunctionCall {
            id: "call_1".into(),
            name: "add".into(),
            arguments: Map::new(),
        };
        h.push(Message::assistant_tool_calls(&[call]));
        assert!(h.validate_tool_call_pairing().is_err());
    }

    #[test]
    fn test_system_merge_into_first_user_message() {
        let mut h = History::new("test");
        h.push(Message::system("Be helpful."));
        h.push(Message::user("What's 2+2?"));

        let merged = h.with_system_merged_into_user();
        assert_eq!(merged.messages.len(), 1);
        match &merged.messages[0].contents[0] {
            MessageContent::Text(t) => {
                assert!(t.starts_with("Be helpful.\n\n"));
                assert!(t.ends_with("What's 2+2?"));
            }
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn test_system_merge_inserts_user_message_if_none_exists() {
        let mut h = History::new("test");
        h.push(Message::system("Be helpful."));
        let merged = h.with_system_merged_into_user();
        assert_eq!(merged.messages.len(), 1);
        assert_eq!(merged.messages[0].role, Role::User);
    }

    #[test]
    fn test_push_input_function_response_becomes_tool_message() {
        let mut h = History::new("test");
        h.push_input(&Input::function_response(
            "call_1",
            "add",
            serde_json::json!({"result": 8}),
            None,
        ));
        assert_eq!(h.messages[0].role, Role::Tool);
    }

    #[test]
    fn test_content_encodes_as_type_data_envelope() {
        let content = MessageContent::text("hi");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["data"], "hi");
    }
}
