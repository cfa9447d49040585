//! Core value types: inputs, responses, tool specs, and the `Tool`/`ToolSet`
//! capability traits.
//!
//! These are the leaves of the dependency graph — everything else in the
//! crate (history, session, strategies, the executor) is built on top of
//! them.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// IMAGE / PDF ATTACHMENTS
// ============================================================================

/// Level of visual detail a vision-capable provider should use when
/// processing an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

/// An image attachment, either a remote URL (including `data:` URIs) or
/// inline bytes with an explicit media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImageInput {
    Url { url: String, detail: ImageDetail },
    Bytes {
        media_type: String,
        data: Vec<u8>,
        detail: ImageDetail,
    },
}

impl ImageInput {
    /// Build an image input from a URL or data URI.
    pub fn from_url(url: impl Into<String>) -> Self {
        ImageInput::Url {
            url: url.into(),
            detail: ImageDetail::Auto,
        }
    }

    /// Build an image input from inline bytes and a media type
    /// (e.g. `"image/png"`).
    pub fn from_bytes(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        ImageInput::Bytes {
            media_type: media_type.into(),
            data,
            detail: ImageDetail::Auto,
        }
    }

    /// Override the detail level.
    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        match &mut self {
            ImageInput::Url { detail: d, .. } => *d = detail,
            ImageInput::Bytes { detail: d, .. } => *d = detail,
        }
        self
    }
}

/// A PDF attachment, either a remote URL or inline bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PdfInput {
    Url(String),
    Bytes(Vec<u8>),
}

impl PdfInput {
    pub fn from_url(url: impl Into<String>) -> Self {
        PdfInput::Url(url.into())
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        PdfInput::Bytes(data)
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// A unit of conversation input, produced either by a caller (the user's
/// prompt, attachments) or by the executor feeding tool results back to the
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Input {
    /// Plain text, either a user prompt or a system/assistant text segment.
    Text(String),

    /// The result of a tool call, correlated back to the `FunctionCall.id`
    /// that requested it.
    FunctionResponse {
        id: String,
        name: String,
        data: Value,
        error: Option<String>,
    },

    Image(ImageInput),
    Pdf(PdfInput),
}

impl Input {
    pub fn text(s: impl Into<String>) -> Self {
        Input::Text(s.into())
    }

    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        data: Value,
        error: Option<String>,
    ) -> Self {
        Input::FunctionResponse {
            id: id.into(),
            name: name.into(),
            data,
            error,
        }
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

/// One function/tool call requested by the provider in a single turn.
///
/// `id` is the correlation key that must round-trip in the matching
/// `Input::FunctionResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// What a single provider turn yields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub texts: Vec<String>,
    pub function_calls: Vec<FunctionCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn text_only(texts: Vec<String>) -> Self {
        Response {
            texts,
            ..Default::default()
        }
    }

    /// True if the provider asked for tool calls in this turn.
    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

// ============================================================================
// TOOL SPEC / PARAMETER
// ============================================================================

/// JSON-Schema-like scalar/container type for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// A single parameter node in a `ToolSpec`'s schema.
///
/// Invariants (enforced by [`Parameter::validate`], called from
/// [`ToolSpec::validate`]):
/// - `Object` parameters must carry `properties`.
/// - `Array` parameters must carry `items`.
/// - `enum_values` is only meaningful on `String` parameters.
/// - Names within `properties` are unique (enforced by the map type itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Parameter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Parameter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(param_type: ParameterType) -> Self {
        Parameter {
            param_type,
            description: None,
            title: None,
            enum_values: None,
            properties: None,
            required: None,
            items: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
            min_items: None,
            max_items: None,
            default: None,
        }
    }

    pub fn string() -> Self {
        Parameter::new(ParameterType::String)
    }

    pub fn number() -> Self {
        Parameter::new(ParameterType::Number)
    }

    pub fn integer() -> Self {
        Parameter::new(ParameterType::Integer)
    }

    pub fn boolean() -> Self {
        Parameter::new(ParameterType::Boolean)
    }

    pub fn array(items: Parameter) -> Self {
        let mut p = Parameter::new(ParameterType::Array);
        p.items = Some(Box::new(items));
        p
    }

    pub fn object(properties: BTreeMap<String, Parameter>) -> Self {
        let mut p = Parameter::new(ParameterType::Object);
        p.properties = Some(properties);
        p
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Enforce the structural invariants named in the specification.
    pub fn validate(&self, path: &str) -> Result<()> {
        match self.param_type {
            ParameterType::Object => {
                let props = self.properties.as_ref().ok_or_else(|| {
                    Error::invalid_tool(format!("{path}: object parameter requires properties"))
                })?;
                for (name, child) in props {
                    child.validate(&format!("{path}.{name}"))?;
                }
            }
            ParameterType::Array => {
                let items = self.items.as_ref().ok_or_else(|| {
                    Error::invalid_tool(format!("{path}: array parameter requires items"))
                })?;
                items.validate(&format!("{path}[]"))?;
            }
            _ => {
                if self.properties.is_some() {
                    return Err(Error::invalid_tool(format!(
                        "{path}: only object parameters may carry properties"
                    )));
                }
                if self.items.is_some() {
                    return Err(Error::invalid_tool(format!(
                        "{path}: only array parameters may carry items"
                    )));
                }
            }
        }
        if self.enum_values.is_some() && self.param_type != ParameterType::String {
            return Err(Error::invalid_tool(format!(
                "{path}: enum is only valid on string parameters"
            )));
        }
        Ok(())
    }
}

/// The capability contract an LLM sees for a single tool: name, description,
/// and a JSON-Schema-like parameter map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, Parameter>,
    pub required: Vec<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Validate the schema invariants from the specification: object types
    /// have properties, array types have items, enum only on strings, and
    /// parameter names are unique within the top-level map (guaranteed by
    /// `IndexMap`, checked here defensively against duplicate `required`
    /// entries pointing at unknown names).
    pub fn validate(&self) -> Result<()> {
        for (name, param) in &self.parameters {
            param.validate(&format!("{}.{name}", self.name))?;
        }
        let known: BTreeSet<&str> = self.parameters.keys().map(|s| s.as_str()).collect();
        for req in &self.required {
            if !known.contains(req.as_str()) {
                return Err(Error::invalid_tool(format!(
                    "{}: required names unknown parameter '{req}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TOOL / TOOLSET
// ============================================================================

/// A single callable capability exposed to the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The schema the LLM sees for this tool.
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with the arguments the provider supplied (already
    /// JSON-decoded). Failures are returned as `Err` and converted by the
    /// dispatcher into a `FunctionResponse.error` — they must not abort the
    /// dispatch batch.
    async fn run(&self, args: Map<String, Value>) -> Result<Value>;
}

/// A dynamically discovered collection of tools whose specs may change
/// between calls (e.g. sourced from an external tool server). Implementations
/// must tolerate `specs` being called concurrently with `run`.
#[async_trait]
pub trait ToolSet: Send + Sync {
    async fn specs(&self) -> Result<Vec<ToolSpec>>;
    async fn run(&self, name: &str, args: Map<String, Value>) -> Result<Value>;
}
