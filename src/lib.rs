//! # agent-core
//!
//! A provider-neutral runtime for LLM-driven agents: a bounded execution
//! loop, pluggable decision strategies (simple, plan-and-execute,
//! reflexion), a provider-neutral conversation history with compaction, and
//! structured span tracing.
//!
//! ## Overview
//!
//! The crate has no bundled provider integration — `LLMClient`/`Session` are
//! traits a caller implements against their own model backend (OpenAI,
//! Anthropic, a local server, whatever). What the crate owns is everything
//! above that seam:
//!
//! - **agent**: the outer execution loop (`Agent::execute`), tool dispatch,
//!   history persistence, tracing, and optional compaction.
//! - **strategy**: the per-iteration decision policy — `SimpleStrategy`,
//!   `PlanAndExecuteStrategy`, `ReflexionStrategy` — and the `Strategy`
//!   extension point for custom policies.
//! - **history**: the provider-neutral conversation record and its wire
//!   format.
//! - **compaction**: summarizing a history's prefix when it outgrows a
//!   token budget, without splitting a tool-call/response pair.
//! - **trace**: structured span tracing across agent/LLM/tool/sub-agent
//!   operations.
//! - **repository**: persistence boundaries for history and traces.
//! - **retry**: exponential backoff retry logic with jitter, for a concrete
//!   `LLMClient` implementation's own provider calls.
//! - **tools**: the `Tool`/`ToolSet` capability traits and a registry that
//!   aggregates both behind one namespace.
//! - **hooks**: lifecycle callbacks fired during execution.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_core::{Agent, AgentOptions, Input};
//! use agent_core::strategy::SimpleStrategy;
//! use std::sync::Arc;
//!
//! # async fn run(llm_client: Arc<dyn agent_core::session::LLMClient>) -> agent_core::Result<()> {
//! let options = AgentOptions::builder()
//!     .system_prompt("You are a helpful assistant")
//!     .max_iterations(10)
//!     .build()?;
//!
//! let mut agent = Agent::new(llm_client, SimpleStrategy::new(), options);
//! let response = agent.execute(vec![Input::text("What's 2+2?")]).await?;
//! println!("{:?}", response.texts);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The outer execution loop: `Agent`, `AgentOptions`, `AgentOptionsBuilder`.
pub mod agent;

/// Provider configuration helpers.
pub mod config;

/// History compaction: summarizing a prefix when the token budget is
/// exceeded, without splitting a tool-call/response pair.
pub mod compaction;

/// Parallel tool dispatch for one assistant turn's function calls.
pub mod dispatch;

/// Error types and conversions used throughout the crate.
pub mod error;

/// Lifecycle hooks fired during execution.
pub mod hooks;

/// The provider-neutral conversation history and its wire format.
pub mod history;

/// Persistence boundaries for conversation history and traces.
pub mod repository;

/// Exponential backoff retry logic with jitter. Opt-in: a concrete
/// `LLMClient` implementation may use this for its own provider calls; the
/// core executor never calls it automatically.
pub mod retry;

/// The provider-bound `Session`/`LLMClient` trait boundary.
pub mod session;

/// The pluggable per-iteration decision policy.
pub mod strategy;

/// Tool definitions, the `ToolBuilder`, and the aggregating `ToolRegistry`.
pub mod tools;

/// Structured span tracing across agent/LLM/tool/sub-agent operations.
pub mod trace;

/// Core value types: `Input`, `Response`, `ToolSpec`, the `Tool`/`ToolSet`
/// traits.
pub mod value;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

pub use agent::{Agent, AgentOptions, AgentOptionsBuilder};

pub use config::{get_base_url, get_model, Provider};

pub use error::{Error, Result};

pub use hooks::{
    CompactionEvent, Hooks, MessageEvent, NoopHooks, ToolErrorEvent, ToolRequestEvent,
    ToolResponseEvent,
};

pub use history::{History, Message, MessageContent, Role};

pub use repository::{
    HistoryRepository, InMemoryHistoryRepository, InMemoryTraceRepository, TraceRepository,
};

pub use session::{ContentType, LLMClient, Middleware, Session, SessionOptions};

pub use tools::{tool, ToolBuilder, ToolRegistry};

pub use trace::{Handler, NoopHandler, Recorder, Span, SpanKind, SpanStatus, TraceContext};

pub use value::{
    FunctionCall, ImageDetail, ImageInput, Input, Parameter, ParameterType, PdfInput, Response,
    Tool, ToolSet, ToolSpec,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types for building and running an agent.
///
/// Import with `use agent_core::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, Error, FunctionCall, History, Hooks, Input,
        Response, Result, Tool, ToolRegistry, ToolSet, ToolSpec,
    };
    pub use crate::strategy::{
        PlanAndExecuteStrategy, ReflexionStrategy, SimpleStrategy, Strategy,
    };
    pub use crate::trace::{Handler, TraceContext};
}
