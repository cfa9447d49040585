//! The Reflexion strategy (§4.7): run a fixed number of trials, evaluate each
//! trajectory, and — short of success — reflect on the failure and retry
//! with the reflection prepended as episodic memory.

use super::{ExecuteResponse, Strategy, StrategyOutcome, StrategyState};
use crate::error::{Error, Result};
use crate::session::{ContentType, SessionOptions};
use crate::value::{FunctionCall, Input};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;

const DEFAULT_MAX_TRIALS: u32 = 3;
const DEFAULT_MEMORY_SIZE: usize = 3;

/// One step of a trial: either the provider's own turn or the tool result
/// fed back in response to it.
#[derive(Debug, Clone)]
pub enum TrajectoryStep {
    Assistant { texts: Vec<String>, calls: Vec<FunctionCall> },
    ToolResult(Input),
}

/// The full record of one trial, handed to the `Evaluator`.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    pub steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    fn final_texts(&self) -> Vec<String> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| match s {
                TrajectoryStep::Assistant { texts, .. } if !texts.is_empty() => Some(texts.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// What an `Evaluator` decides about a finished trial.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub success: bool,
    pub score: f64,
    pub feedback: String,
}

/// Judges whether a trajectory satisfies the original goal. Implementations
/// are free to use an LLM call, a programmatic check, or both — out of scope
/// for this crate's core, same as `LLMClient`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, goal: &str, trajectory: &Trajectory) -> Result<EvaluationResult>;
}

/// One past trial's reflection, kept as a bounded FIFO memory across trials.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub trial: u32,
    pub feedback: String,
    pub reflection: String,
}

/// Lifecycle hooks specific to the reflexion strategy. All methods default
/// to no-ops.
pub trait ReflexionHooks: Send + Sync {
    fn on_trial_started(&self, _trial: u32) {}
    fn on_trial_evaluated(&self, _trial: u32, _result: &EvaluationResult) {}
    fn on_reflection(&self, _entry: &MemoryEntry) {}
}

#[derive(Default)]
pub struct NoopReflexionHooks;
impl ReflexionHooks for NoopReflexionHooks {}

#[derive(Debug, Default, Deserialize)]
struct ReflectionResponse {
    reflection: String,
}

fn first_json_text(response: &crate::value::Response) -> Result<String> {
    response
        .texts
        .iter()
        .find(|t| !t.trim().is_empty())
        .cloned()
        .ok_or_else(|| Error::provider("JSON-mode turn returned no text"))
}

#[derive(Debug, Clone)]
enum Phase {
    Trial { trial: u32 },
    Done,
}

/// Runs up to `max_trials` trials of the underlying task, bounded episodic
/// memory of size `memory_size` carried between trials as a prefix prompt.
pub struct ReflexionStrategy {
    evaluator: std::sync::Arc<dyn Evaluator>,
    hooks: std::sync::Arc<dyn ReflexionHooks>,
    max_trials: u32,
    memory_size: usize,
    goal: String,
    init_input: Vec<Input>,
    memory: VecDeque<MemoryEntry>,
    trajectory: Trajectory,
    phase: Phase,
}

impl ReflexionStrategy {
    pub fn new(evaluator: std::sync::Arc<dyn Evaluator>) -> Self {
        ReflexionStrategy {
            evaluator,
            hooks: std::sync::Arc::new(NoopReflexionHooks),
            max_trials: DEFAULT_MAX_TRIALS,
            memory_size: DEFAULT_MEMORY_SIZE,
            goal: String::new(),
            init_input: Vec::new(),
            memory: VecDeque::new(),
            trajectory: Trajectory::default(),
            phase: Phase::Trial { trial: 0 },
        }
    }

    pub fn with_hooks(mut self, hooks: std::sync::Arc<dyn ReflexionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_max_trials(mut self, max_trials: u32) -> Self {
        self.max_trials = max_trials;
        self
    }

    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    fn memory_prefix(&self) -> Option<Input> {
        if self.memory.is_empty() {
            return None;
        }
        let joined = self
            .memory
            .iter()
            .map(|m| format!("Trial {}: {}\nReflection: {}", m.trial, m.feedback, m.reflection))
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(Input::text(format!(
            "Previous attempts at this task failed. Learn from them:\n\n{joined}"
        )))
    }

    fn start_trial_inputs(&self) -> Vec<Input> {
        match self.memory_prefix() {
            Some(prefix) => {
                let mut inputs = vec![prefix];
                inputs.extend(self.init_input.clone());
                inputs
            }
            None => self.init_input.clone(),
        }
    }

    async fn run_reflection_session(
        &self,
        state: &StrategyState<'_>,
        evaluation: &EvaluationResult,
    ) -> Result<String> {
        let mut session = state
            .llm_client
            .new_session(
                SessionOptions::new()
                    .with_content_type(ContentType::Json)
                    .with_system_prompt(
                        "A trial at the task below failed. Reply with JSON: {\"reflection\": \
                         string} — a short, concrete lesson to apply next attempt.",
                    ),
            )
            .await?;
        let prompt = serde_json::json!({
            "goal": self.goal,
            "feedback": evaluation.feedback,
            "final_texts": self.trajectory.final_texts(),
        })
        .to_string();
        let response = session.generate_content(vec![Input::text(prompt)]).await?;
        let text = first_json_text(&response)?;
        let parsed: ReflectionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::provider(format!("malformed JSON-mode response: {e}")))?;
        Ok(parsed.reflection)
    }

    fn push_memory(&mut self, entry: MemoryEntry) {
        self.hooks.on_reflection(&entry);
        if self.memory.len() >= self.memory_size {
            self.memory.pop_front();
        }
        self.memory.push_back(entry);
    }
}

#[async_trait]
impl Strategy for ReflexionStrategy {
    async fn init(&mut self, initial_inputs: &[Input]) -> Result<()> {
        self.init_input = initial_inputs.to_vec();
        self.goal = initial_inputs
            .iter()
            .filter_map(|i| match i {
                Input::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.memory.clear();
        self.trajectory = Trajectory::default();
        self.phase = Phase::Trial { trial: 0 };
        Ok(())
    }

    async fn handle(&mut self, state: StrategyState<'_>) -> Result<StrategyOutcome> {
        match self.phase.clone() {
            Phase::Trial { trial } if state.last_response.is_none() => {
                self.hooks.on_trial_started(trial);
                self.trajectory = Trajectory::default();
                Ok(StrategyOutcome::Continue(self.start_trial_inputs()))
            }

            Phase::Trial { trial } => {
                let last = state
                    .last_response
                    .expect("iteration > 0 always carries a last_response");
                self.trajectory.steps.push(TrajectoryStep::Assistant {
                    texts: last.texts.clone(),
                    calls: last.function_calls.clone(),
                });

                if last.has_function_calls() {
                    for input in state.next_input {
                        self.trajectory.steps.push(TrajectoryStep::ToolResult(input.clone()));
                    }
                    return Ok(StrategyOutcome::Continue(state.next_input.to_vec()));
                }

                let evaluation = self.evaluator.evaluate(&self.goal, &self.trajectory).await?;
                self.hooks.on_trial_evaluated(trial, &evaluation);

                if evaluation.success || trial + 1 >= self.max_trials {
                    self.phase = Phase::Done;
                    return Ok(StrategyOutcome::Terminal(ExecuteResponse {
                        texts: self.trajectory.final_texts(),
                    }));
                }

                let reflection = self.run_reflection_session(&state, &evaluation).await?;
                self.push_memory(MemoryEntry {
                    trial,
                    feedback: evaluation.feedback.clone(),
                    reflection,
                });

                let next_trial = trial + 1;
                self.phase = Phase::Trial { trial: next_trial };
                self.hooks.on_trial_started(next_trial);
                self.trajectory = Trajectory::default();
                Ok(StrategyOutcome::Continue(self.start_trial_inputs()))
            }

            Phase::Done => Ok(StrategyOutcome::Terminal(ExecuteResponse::default())),
        }
    }
}
