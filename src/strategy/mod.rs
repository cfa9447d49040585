//! The strategy extension point (§4.4): a per-iteration decision policy that
//! chooses the next LLM input or terminates the execution.

pub mod plan_execute;
pub mod reflexion;
pub mod simple;

use crate::error::Result;
use crate::history::History;
use crate::session::{LLMClient, Session};
use crate::value::{Input, Response, Tool};
use async_trait::async_trait;
use std::sync::Arc;

pub use plan_execute::{Plan, PlanAndExecuteStrategy, PlanExecuteHooks, Task, TaskState};
pub use reflexion::{
    EvaluationResult, Evaluator, MemoryEntry, ReflexionHooks, ReflexionStrategy, Trajectory,
};
pub use simple::SimpleStrategy;

/// What `Execute` ultimately returns: the terminal texts of a successful
/// run.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResponse {
    pub texts: Vec<String>,
}

/// Per-iteration state the executor hands to `Strategy::handle`.
///
/// Iteration 0 is special: `next_input` is empty and `init_input` holds the
/// caller's original prompt; subsequent iterations carry the tool results in
/// `next_input` and the provider's last turn in `last_response`.
pub struct StrategyState<'a> {
    pub iteration: u32,
    pub init_input: &'a [Input],
    pub next_input: &'a [Input],
    pub last_response: Option<&'a Response>,
    pub session: &'a mut dyn Session,
    pub tools: &'a [Arc<dyn Tool>],
    pub system_prompt: Option<&'a str>,
    pub history: &'a History,
    pub llm_client: &'a dyn LLMClient,
    pub max_iterations: u32,
}

/// Outcome of one `Strategy::handle` call: exactly one of `inputs` and
/// `terminal` is populated on a successful return.
pub enum StrategyOutcome {
    Continue(Vec<Input>),
    Terminal(ExecuteResponse),
}

/// The pluggable per-iteration decision policy.
///
/// Internal strategy state (a plan, episodic memory, task counters) is
/// owned exclusively by the strategy instance for the duration of one
/// `Execute` call; nothing is shared across executions.
#[async_trait]
pub trait Strategy: Send {
    /// Reset per-execution state for a new `Execute` call.
    async fn init(&mut self, initial_inputs: &[Input]) -> Result<()>;

    /// Decide what to send next, or terminate the execution.
    async fn handle(&mut self, state: StrategyState<'_>) -> Result<StrategyOutcome>;

    /// Additional tools this strategy contributes (usually empty).
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }
}
