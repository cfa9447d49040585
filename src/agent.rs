//! The agent executor (§4.2): the outer loop that drives a `Strategy`
//! against a `Session`, dispatching tool calls and persisting history between
//! runs.

use crate::compaction::{estimate_message_tokens, Compactor, CompactorConfig};
use crate::dispatch::dispatch_calls;
use crate::error::{Error, Result};
use crate::history::{History, Message, MessageContent};
use crate::hooks::{CompactionEvent, Hooks, MessageEvent, NoopHooks};
use crate::repository::HistoryRepository;
use crate::session::{commit_turn, LLMClient, Session, SessionOptions};
use crate::strategy::{ExecuteResponse, Strategy, StrategyOutcome, StrategyState};
use crate::tools::ToolRegistry;
use crate::trace::{Handler, NoopHandler, SpanStatus, TraceContext};
use crate::value::{Input, Tool, ToolSet};
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_MAX_ITERATIONS: u32 = 32;
const DEFAULT_SESSION_ID: &str = "default";

/// Configuration for one `Agent`. Build with [`AgentOptions::builder`].
pub struct AgentOptions {
    pub system_prompt: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub tool_sets: Vec<Arc<dyn ToolSet>>,
    pub max_iterations: u32,
    pub hooks: Arc<dyn Hooks>,
    pub trace_handler: Arc<dyn Handler>,
    pub compaction: Option<CompactorConfig>,
    pub history_repository: Option<Arc<dyn HistoryRepository>>,
    pub session_id: String,
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::new()
    }
}

/// Fluent builder for `AgentOptions`, validated in `build()`.
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    tool_sets: Vec<Arc<dyn ToolSet>>,
    max_iterations: u32,
    hooks: Option<Arc<dyn Hooks>>,
    trace_handler: Option<Arc<dyn Handler>>,
    compaction: Option<CompactorConfig>,
    history_repository: Option<Arc<dyn HistoryRepository>>,
    session_id: Option<String>,
}

impl AgentOptionsBuilder {
    pub fn new() -> Self {
        AgentOptionsBuilder {
            system_prompt: None,
            tools: Vec::new(),
            tool_sets: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            hooks: None,
            trace_handler: None,
            compaction: None,
            history_repository: None,
            session_id: None,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_set(mut self, tool_set: Arc<dyn ToolSet>) -> Self {
        self.tool_sets.push(tool_set);
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn trace_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.trace_handler = Some(handler);
        self
    }

    pub fn compaction(mut self, config: CompactorConfig) -> Self {
        self.compaction = Some(config);
        self
    }

    pub fn history_repository(mut self, repository: Arc<dyn HistoryRepository>) -> Self {
        self.history_repository = Some(repository);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be greater than zero"));
        }
        Ok(AgentOptions {
            system_prompt: self.system_prompt,
            tools: self.tools,
            tool_sets: self.tool_sets,
            max_iterations: self.max_iterations,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
            trace_handler: self.trace_handler.unwrap_or_else(|| Arc::new(NoopHandler)),
            compaction: self.compaction,
            history_repository: self.history_repository,
            session_id: self.session_id.unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
        })
    }
}

impl Default for AgentOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn render_message_text(message: &Message) -> String {
    let role = format!("{:?}", message.role);
    let text = message
        .contents
        .iter()
        .filter_map(|c| match c {
            MessageContent::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{role}: {text}")
}

async fn summarize_prefix(llm_client: &dyn LLMClient, prefix: Vec<Message>) -> Result<String> {
    let transcript = prefix.iter().map(render_message_text).collect::<Vec<_>>().join("\n");
    let mut session = llm_client
        .new_session(SessionOptions::new().with_system_prompt(
            "Summarize the following conversation transcript concisely, preserving facts, \
             decisions, and any unresolved tasks.",
        ))
        .await?;
    let response = session.generate_content(vec![Input::text(transcript)]).await?;
    Ok(response.texts.join("\n"))
}

/// The outer execution loop (§4.2): builds a session and tool registry,
/// drives `strategy` one iteration at a time, dispatches tool calls, and
/// persists history through `AgentOptions::history_repository`.
pub struct Agent<S: Strategy> {
    llm_client: Arc<dyn LLMClient>,
    strategy: S,
    options: AgentOptions,
}

impl<S: Strategy> Agent<S> {
    pub fn new(llm_client: Arc<dyn LLMClient>, strategy: S, options: AgentOptions) -> Self {
        Agent {
            llm_client,
            strategy,
            options,
        }
    }

    /// Run to completion with no cancellation support.
    pub async fn execute(&mut self, initial_inputs: Vec<Input>) -> Result<ExecuteResponse> {
        self.execute_with_cancel(initial_inputs, &CancellationToken::new()).await
    }

    /// Run to completion, honoring `cancel` between and during iterations.
    pub async fn execute_with_cancel(
        &mut self,
        initial_inputs: Vec<Input>,
        cancel: &CancellationToken,
    ) -> Result<ExecuteResponse> {
        debug!(
            "agent.execute starting: session_id={}, max_iterations={}",
            self.options.session_id, self.options.max_iterations
        );
        let trace_handler = self.options.trace_handler.clone();
        let root_ctx = TraceContext::root(Uuid::now_v7());
        let exec_ctx = trace_handler.start_agent_execute(&root_ctx, "agent.execute");

        let mut turn_tools: Vec<Arc<dyn Tool>> = self.options.tools.clone();
        turn_tools.extend(self.strategy.tools());
        let registry = ToolRegistry::build(turn_tools.clone(), self.options.tool_sets.clone()).await?;

        let loaded_history = match &self.options.history_repository {
            Some(repo) => repo.load(&self.options.session_id).await?,
            None => None,
        };
        let mut current_history = loaded_history.unwrap_or_else(|| History::new("agent"));
        if let Some(system_prompt) = &self.options.system_prompt {
            if current_history.is_empty() {
                current_history.push(Message::system(system_prompt.clone()));
            }
        }
        self.llm_client.is_compatible_history(&current_history)?;

        let mut session = self
            .llm_client
            .new_session(
                SessionOptions::new()
                    .with_tools(turn_tools.clone())
                    .with_history(current_history.clone()),
            )
            .await?;

        self.strategy.init(&initial_inputs).await?;

        let mut iteration = 0u32;
        let mut last_response = None;
        let mut next_input: Vec<Input> = Vec::new();

        let result: Result<ExecuteResponse> = 'outer: loop {
            if cancel.is_cancelled() {
                debug!("agent.execute cancelled before iteration {iteration}");
                break 'outer Err(Error::Cancelled);
            }
            if iteration > self.options.max_iterations {
                warn!(
                    "agent.execute hit the iteration cap ({}) without the strategy terminating",
                    self.options.max_iterations
                );
                break 'outer Err(Error::LoopLimitExceeded(self.options.max_iterations));
            }
            trace!("agent.execute iteration {iteration}: history len={}", current_history.len());

            if let Some(config) = self.options.compaction {
                let compactor = Compactor::new(config);
                if compactor.should_compact(self.llm_client.as_ref(), &current_history).await? {
                    debug!(
                        "history over budget at iteration {iteration}, compacting {} messages",
                        current_history.len()
                    );
                    let original = current_history.clone();
                    let llm_client = self.llm_client.as_ref();
                    let compacted = compactor
                        .compact(&current_history, estimate_message_tokens, |prefix| {
                            summarize_prefix(llm_client, prefix)
                        })
                        .await?;
                    self.options.hooks.on_compaction(CompactionEvent {
                        original: &original,
                        compacted: &compacted,
                    })?;
                    current_history = compacted;
                }
            }

            let state = StrategyState {
                iteration,
                init_input: &initial_inputs,
                next_input: &next_input,
                last_response: last_response.as_ref(),
                session: session.as_mut(),
                tools: &turn_tools,
                system_prompt: self.options.system_prompt.as_deref(),
                history: &current_history,
                llm_client: self.llm_client.as_ref(),
                max_iterations: self.options.max_iterations,
            };

            let outcome = match self.strategy.handle(state).await {
                Ok(o) => o,
                Err(e) => break 'outer Err(e),
            };
            let inputs = match outcome {
                StrategyOutcome::Terminal(resp) => break 'outer Ok(resp),
                StrategyOutcome::Continue(inputs) => inputs,
            };
            for input in &inputs {
                current_history.push_input(input);
            }

            let llm_ctx = trace_handler.start_llm_call(&exec_ctx, "generate_content");
            trace!("generate_content request at iteration {iteration}: {inputs:?}");
            let generated = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                r = session.generate_content(inputs) => r,
            };
            let response = match generated {
                Ok(r) => {
                    debug!(
                        "generate_content returned {} text segment(s) and {} tool call(s) ({} in / {} out tokens)",
                        r.texts.len(),
                        r.function_calls.len(),
                        r.input_tokens,
                        r.output_tokens
                    );
                    trace_handler.end_llm_call(
                        &llm_ctx,
                        serde_json::json!({
                            "input_tokens": r.input_tokens,
                            "output_tokens": r.output_tokens,
                        }),
                        SpanStatus::Ok,
                        None,
                    );
                    r
                }
                Err(e) => {
                    warn!("generate_content failed at iteration {iteration}: {e}");
                    trace_handler.end_llm_call(&llm_ctx, serde_json::Value::Null, SpanStatus::Error, Some(&e.to_string()));
                    break 'outer Err(e);
                }
            };

            commit_turn(&mut current_history, &response);
            for text in &response.texts {
                if let Err(e) = self.options.hooks.on_message(MessageEvent {
                    text,
                    history: &current_history,
                }) {
                    break 'outer Err(e);
                }
            }

            if response.has_function_calls() {
                debug!("dispatching {} tool call(s)", response.function_calls.len());
                let tool_ctx = trace_handler.start_tool_exec(&exec_ctx, "dispatch");
                let dispatched = dispatch_calls(
                    &registry,
                    &response.function_calls,
                    self.options.hooks.as_ref(),
                    &current_history,
                    cancel,
                )
                .await;
                match &dispatched {
                    Ok(_) => trace_handler.end_tool_exec(&tool_ctx, serde_json::Value::Null, SpanStatus::Ok, None),
                    Err(e) => trace_handler.end_tool_exec(
                        &tool_ctx,
                        serde_json::Value::Null,
                        SpanStatus::Error,
                        Some(&e.to_string()),
                    ),
                }
                let responses = match dispatched {
                    Ok(r) => r,
                    Err(e) => break 'outer Err(e),
                };
                for input in &responses {
                    current_history.push_input(input);
                }
                next_input = responses;
            } else {
                next_input = Vec::new();
            }

            last_response = Some(response);
            iteration += 1;
        };

        if let Some(repo) = &self.options.history_repository {
            repo.save(&self.options.session_id, &current_history).await?;
        }

        match &result {
            Ok(r) => {
                debug!("agent.execute finished after {iteration} iteration(s): {} text segment(s)", r.texts.len());
                trace_handler.end_agent_execute(&exec_ctx, SpanStatus::Ok, None)
            }
            Err(e) => {
                warn!("agent.execute aborted after {iteration} iteration(s): {e}");
                trace_handler.end_agent_execute(&exec_ctx, SpanStatus::Error, Some(&e.to_string()))
            }
        }
        trace_handler.finish(&root_ctx).await?;

        result
    }
}
