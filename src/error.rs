//! # Error Types
//!
//! Defines the error type and conversions used throughout the crate.
//!
//! ## Design Philosophy
//!
//! - **Explicit Error Handling**: Uses Rust's `Result<T>` type for all fallible operations
//! - **No Silent Failures**: All errors are propagated explicitly to the caller
//! - **Rich Context**: Each error variant provides specific information about what went wrong
//! - **Easy Conversion**: Automatic conversion from common error types (serde_json)
//!
//! ## Usage
//!
//! ```ignore
//! use agent_core::{Error, Result};
//!
//! fn example() -> Result<()> {
//!     if some_condition {
//!         return Err(Error::config("Invalid model name"));
//!     }
//!
//!     let json = serde_json::from_str(data)?; // Auto-converts serde_json::Error
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Type alias for `Result<T, Error>` used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// ERROR ENUM
// ============================================================================

/// Comprehensive error type covering all failure modes in the agent runtime.
///
/// Each variant corresponds to one of the error tags in the specification's
/// error handling design: malformed inputs, tool configuration conflicts,
/// loop and token limits, provider failures, and cancellation.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller or provider supplied an input the runtime doesn't recognize:
    /// an unknown `Input` variant, or malformed tool call arguments.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A tool-set returned a `ToolSpec` that violates the parameter schema
    /// invariants (e.g. an object type with no properties, an enum on a
    /// non-string type, duplicate parameter names).
    #[error("invalid tool schema: {0}")]
    InvalidTool(String),

    /// Two tools (built-in or from different tool-sets) registered the same
    /// name. Detected at agent construction time, before any provider call.
    #[error("tool name conflict: {0}")]
    ToolNameConflict(String),

    /// The executor reached its iteration cap without the strategy
    /// terminating the execution.
    #[error("iteration cap exceeded after {0} iterations")]
    LoopLimitExceeded(u32),

    /// The provider reported that the request exceeds the model's context
    /// window. Distinguished from a generic `ProviderError` so callers can
    /// react by triggering compaction or truncation.
    #[error("token limit exceeded: {0}")]
    TokenExceeded(String),

    /// The underlying provider call failed for a reason other than a token
    /// limit. Wraps the provider's own error message.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// `LLMClient::is_compatible_history` rejected a history tagged for a
    /// different provider family or a newer schema version than this
    /// provider understands.
    #[error("incompatible history: {0}")]
    HistoryIncompatible(String),

    /// The operation was cancelled via its context/cancellation token before
    /// completing.
    #[error("operation cancelled")]
    Cancelled,

    /// JSON serialization or deserialization failed.
    ///
    /// Wraps `serde_json::Error` and converts automatically via `?`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration provided when building `AgentOptions` or
    /// `Session` options: missing required fields, invalid ranges.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Tool execution failed. Only used for hook-surfaced or registration
    /// failures; a failing `Tool::run` is captured in `FunctionResponse.error`
    /// instead of propagated as an `Err`.
    #[error("tool execution error: {0}")]
    Tool(String),

    /// A lifecycle hook returned an error, aborting the execution.
    #[error("hook error: {0}")]
    Hook(String),

    /// Miscellaneous error that doesn't fit other categories.
    #[error("error: {0}")]
    Other(String),
}

// ============================================================================
// CONVENIENCE CONSTRUCTORS
// ============================================================================

impl Error {
    /// Create an `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an `InvalidTool` error.
    pub fn invalid_tool(msg: impl Into<String>) -> Self {
        Error::InvalidTool(msg.into())
    }

    /// Create a `ToolNameConflict` error for the given tool name.
    pub fn tool_name_conflict(name: impl Into<String>) -> Self {
        Error::ToolNameConflict(name.into())
    }

    /// Create a `TokenExceeded` error with the provider's message.
    pub fn token_exceeded(msg: impl Into<String>) -> Self {
        Error::TokenExceeded(msg.into())
    }

    /// Create a `ProviderError` wrapping the provider's own error message.
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::ProviderError(msg.into())
    }

    /// Create a `HistoryIncompatible` error.
    pub fn history_incompatible(msg: impl Into<String>) -> Self {
        Error::HistoryIncompatible(msg.into())
    }

    /// Create a new configuration error with a descriptive message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new tool execution error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new hook error.
    pub fn hook(msg: impl Into<String>) -> Self {
        Error::Hook(msg.into())
    }

    /// Create a new miscellaneous error for cases that don't fit other
    /// categories. Use sparingly.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True if this error represents a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

// ============================================================================
// TESTS
// ============================================================================
