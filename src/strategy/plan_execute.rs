//! The Plan-and-Execute strategy (§4.6): decompose the request into a task
//! list up front, execute tasks one at a time against the main session, and
//! reflect on each completed task to revise the remaining plan.
//!
//! Planning, reflection, and conclusion are driven by short-lived auxiliary
//! JSON-mode sessions the strategy opens for itself via `StrategyState`'s
//! `llm_client`; only per-task execution runs on the executor's main session.

use super::{ExecuteResponse, Strategy, StrategyOutcome, StrategyState};
use crate::error::{Error, Result};
use crate::session::{ContentType, SessionOptions};
use crate::value::Input;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle of one task in a `Plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

/// One unit of work in a `Plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Task {
    fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            description: description.into(),
            state: TaskState::Pending,
            result: None,
        }
    }
}

/// The decomposition the planning session produced, revised in place as
/// tasks complete and reflection proposes changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    #[serde(default)]
    pub context_summary: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub tasks: Vec<Task>,
}

impl Plan {
    fn next_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.state == TaskState::Pending)
    }

    fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}

/// Lifecycle hooks specific to the plan-and-execute strategy. All methods
/// default to no-ops.
pub trait PlanExecuteHooks: Send + Sync {
    fn on_plan_created(&self, _plan: &Plan) {}
    fn on_task_done(&self, _task: &Task) {}
    fn on_plan_updated(&self, _plan: &Plan, _reason: &str) {}
}

/// A `PlanExecuteHooks` implementation with every callback a no-op.
#[derive(Default)]
pub struct NoopPlanExecuteHooks;
impl PlanExecuteHooks for NoopPlanExecuteHooks {}

// ============================================================================
// WIRE SHAPES FOR THE AUXILIARY JSON SESSIONS
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlanningResponse {
    needs_plan: bool,
    #[serde(default)]
    direct_response: Option<String>,
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    context_summary: Option<String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    tasks: Vec<PlanningTask>,
}

#[derive(Debug, Deserialize)]
struct PlanningTask {
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReflectionResponse {
    #[serde(default)]
    new_tasks: Vec<PlanningTask>,
    #[serde(default)]
    updated_tasks: Vec<UpdatedTask>,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct UpdatedTask {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<TaskState>,
}

#[derive(Debug, Deserialize)]
struct ConclusionResponse {
    is_done: bool,
    #[serde(default)]
    final_response: Option<String>,
    #[serde(default)]
    next_task_id: Option<String>,
}

fn first_json_text(response: &crate::value::Response) -> Result<String> {
    response
        .texts
        .iter()
        .find(|t| !t.trim().is_empty())
        .cloned()
        .ok_or_else(|| Error::provider("JSON-mode turn returned no text"))
}

fn parse_json<T: serde::de::DeserializeOwned>(response: &crate::value::Response) -> Result<T> {
    let text = first_json_text(response)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::provider(format!("malformed JSON-mode response: {e}")))
}

// ============================================================================
// STRATEGY
// ============================================================================

#[derive(Debug, Clone)]
enum Phase {
    AwaitingPlan,
    ExecutingTask { task_id: String },
    Done,
}

/// Decomposes the request into a task list, executes tasks one at a time,
/// reflects after each, and concludes once the plan is exhausted or the
/// reflection/conclusion phase decides the goal is met.
pub struct PlanAndExecuteStrategy {
    hooks: std::sync::Arc<dyn PlanExecuteHooks>,
    max_tasks: Option<u32>,
    init_input: Vec<Input>,
    plan: Option<Plan>,
    phase: Phase,
    tasks_executed: u32,
    next_task_id: u32,
}

impl PlanAndExecuteStrategy {
    pub fn new() -> Self {
        PlanAndExecuteStrategy {
            hooks: std::sync::Arc::new(NoopPlanExecuteHooks),
            max_tasks: None,
            init_input: Vec::new(),
            plan: None,
            phase: Phase::AwaitingPlan,
            tasks_executed: 0,
            next_task_id: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: std::sync::Arc<dyn PlanExecuteHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Override the cap on the number of tasks this strategy will execute in
    /// one run. Defaults to the executor's own `max_iterations` (via
    /// `StrategyState`) when unset, so reflection perpetually appending new
    /// tasks can never outlive the executor's own safety net.
    pub fn with_max_tasks(mut self, max_tasks: u32) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    /// Assign the next task its framework-generated id. The LLM never
    /// supplies ids for newly created tasks — only `updated_tasks` entries
    /// reference an id, and those must already exist in the plan.
    fn fresh_task_id(&mut self) -> String {
        self.next_task_id += 1;
        format!("task-{}", self.next_task_id)
    }

    /// Abandon further reflection/conclusion and summarize the plan's final
    /// state mechanically: every task not already `Completed` is marked
    /// `Skipped` so the plan always lands in `{completed, skipped}`.
    fn mechanical_summary(plan: &mut Plan) -> String {
        for task in &mut plan.tasks {
            if task.state != TaskState::Completed {
                task.state = TaskState::Skipped;
            }
        }
        let completed = plan.tasks.iter().filter(|t| t.state == TaskState::Completed).count();
        let skipped = plan.tasks.iter().filter(|t| t.state == TaskState::Skipped).count();
        format!(
            "Reached the iteration cap before the plan finished: {completed} task(s) completed, \
             {skipped} abandoned. Goal: {}",
            plan.goal
        )
    }

    fn user_prompt_text(&self) -> String {
        self.init_input
            .iter()
            .filter_map(|i| match i {
                Input::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn run_planning_session(&self, state: &StrategyState<'_>) -> Result<PlanningResponse> {
        let mut session = state
            .llm_client
            .new_session(
                SessionOptions::new()
                    .with_content_type(ContentType::Json)
                    .with_system_prompt(
                        "Decide whether the user's request needs a multi-step plan. Reply with \
                         JSON: {\"needs_plan\": bool, \"direct_response\": string | null, \
                         \"goal\": string, \"context_summary\": string, \"constraints\": \
                         [string], \"tasks\": [{\"description\": string}]}. Omit the plan fields \
                         and set direct_response when no plan is needed. Do not invent task ids; \
                         they are assigned after planning.",
                    ),
            )
            .await?;
        let response = session
            .generate_content(vec![Input::text(self.user_prompt_text())])
            .await?;
        parse_json(&response)
    }

    async fn run_reflection_session(
        &self,
        state: &StrategyState<'_>,
        plan: &Plan,
        finished_task: &Task,
    ) -> Result<ReflectionResponse> {
        let mut session = state
            .llm_client
            .new_session(
                SessionOptions::new()
                    .with_content_type(ContentType::Json)
                    .with_system_prompt(
                        "A task in an ongoing plan just finished. Decide whether the remaining \
                         plan needs new or updated tasks. Reply with JSON: {\"new_tasks\": \
                         [{\"description\": string}], \"updated_tasks\": [{\"id\": string, \
                         \"description\": string | null, \"state\": string | null}], \"reason\": \
                         string}. New tasks are assigned ids automatically; do not invent them. \
                         Return empty arrays and an empty reason if no change is needed.",
                    ),
            )
            .await?;
        let prompt = serde_json::json!({
            "goal": plan.goal,
            "remaining_tasks": plan.tasks,
            "finished_task": finished_task,
        })
        .to_string();
        let response = session.generate_content(vec![Input::text(prompt)]).await?;
        parse_json(&response)
    }

    async fn run_conclusion_session(
        &self,
        state: &StrategyState<'_>,
        plan: &Plan,
    ) -> Result<ConclusionResponse> {
        let mut session = state
            .llm_client
            .new_session(
                SessionOptions::new()
                    .with_content_type(ContentType::Json)
                    .with_system_prompt(
                        "Given the plan's current state, decide whether the goal is met. Reply \
                         with JSON: {\"is_done\": bool, \"final_response\": string | null, \
                         \"next_task_id\": string | null}. Set next_task_id to the pending task \
                         to run next when is_done is false.",
                    ),
            )
            .await?;
        let prompt = serde_json::json!({ "goal": plan.goal, "tasks": plan.tasks }).to_string();
        let response = session.generate_content(vec![Input::text(prompt)]).await?;
        parse_json(&response)
    }

    fn apply_reflection(&mut self, plan: &mut Plan, reflection: ReflectionResponse) {
        let changed = !reflection.new_tasks.is_empty() || !reflection.updated_tasks.is_empty();
        for new_task in reflection.new_tasks {
            let id = self.fresh_task_id();
            plan.tasks.push(Task::new(id, new_task.description));
        }
        for update in reflection.updated_tasks {
            if let Some(task) = plan.task_mut(&update.id) {
                if let Some(description) = update.description {
                    task.description = description;
                }
                if let Some(state) = update.state {
                    task.state = state;
                }
            }
        }
        if changed {
            self.hooks.on_plan_updated(plan, &reflection.reason);
        }
    }

    fn task_instruction(task: &Task) -> Input {
        Input::text(format!("Complete the following task: {}", task.description))
    }
}

impl Default for PlanAndExecuteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for PlanAndExecuteStrategy {
    async fn init(&mut self, initial_inputs: &[Input]) -> Result<()> {
        self.init_input = initial_inputs.to_vec();
        self.plan = None;
        self.phase = Phase::AwaitingPlan;
        self.tasks_executed = 0;
        Ok(())
    }

    async fn handle(&mut self, state: StrategyState<'_>) -> Result<StrategyOutcome> {
        match self.phase.clone() {
            Phase::AwaitingPlan => {
                let planning = self.run_planning_session(&state).await?;
                if !planning.needs_plan {
                    let text = planning
                        .direct_response
                        .unwrap_or_else(|| "".to_string());
                    self.phase = Phase::Done;
                    return Ok(StrategyOutcome::Terminal(ExecuteResponse { texts: vec![text] }));
                }

                let tasks: Vec<Task> = planning
                    .tasks
                    .into_iter()
                    .map(|t| Task::new(self.fresh_task_id(), t.description))
                    .collect();
                if tasks.is_empty() {
                    return Err(Error::other(
                        "planning session set needs_plan=true but returned no tasks",
                    ));
                }
                let plan = Plan {
                    goal: planning.goal.unwrap_or_default(),
                    context_summary: planning.context_summary.unwrap_or_default(),
                    constraints: planning.constraints,
                    tasks,
                };
                self.hooks.on_plan_created(&plan);
                let first_task_id = plan.tasks[0].id.clone();
                let instruction = Self::task_instruction(&plan.tasks[0]);
                self.plan = Some(plan);
                self.phase = Phase::ExecutingTask {
                    task_id: first_task_id,
                };
                self.tasks_executed += 1;
                Ok(StrategyOutcome::Continue(vec![instruction]))
            }

            Phase::ExecutingTask { task_id } => {
                let last = state
                    .last_response
                    .expect("iteration > 0 always carries a last_response");

                if last.has_function_calls() {
                    return Ok(StrategyOutcome::Continue(state.next_input.to_vec()));
                }

                let mut plan = self.plan.take().expect("plan set once AwaitingPlan exits");
                let result_text = last.texts.join("\n");
                if let Some(task) = plan.task_mut(&task_id) {
                    task.state = TaskState::Completed;
                    task.result = Some(result_text);
                    self.hooks.on_task_done(task);
                }

                let cap = self.max_tasks.unwrap_or(state.max_iterations);
                if self.tasks_executed >= cap {
                    let summary = Self::mechanical_summary(&mut plan);
                    self.plan = Some(plan);
                    self.phase = Phase::Done;
                    return Ok(StrategyOutcome::Terminal(ExecuteResponse { texts: vec![summary] }));
                }

                let finished_task = plan
                    .tasks
                    .iter()
                    .find(|t| t.id == task_id)
                    .cloned()
                    .expect("task just updated above");

                let reflection = self.run_reflection_session(&state, &plan, &finished_task).await?;
                self.apply_reflection(&mut plan, reflection);

                let conclusion = self.run_conclusion_session(&state, &plan).await?;
                if conclusion.is_done {
                    let text = conclusion.final_response.unwrap_or_default();
                    self.plan = Some(plan);
                    self.phase = Phase::Done;
                    return Ok(StrategyOutcome::Terminal(ExecuteResponse { texts: vec![text] }));
                }

                let next_id = conclusion
                    .next_task_id
                    .or_else(|| plan.next_pending().map(|t| t.id.clone()));
                let Some(next_id) = next_id else {
                    self.plan = Some(plan);
                    self.phase = Phase::Done;
                    return Ok(StrategyOutcome::Terminal(ExecuteResponse {
                        texts: vec!["all tasks completed".to_string()],
                    }));
                };
                let instruction = plan
                    .task_mut(&next_id)
                    .map(Self::task_instruction)
                    .ok_or_else(|| Error::other(format!("conclusion referenced unknown task '{next_id}'")))?;
                self.tasks_executed += 1;
                self.phase = Phase::ExecutingTask { task_id: next_id };
                self.plan = Some(plan);
                Ok(StrategyOutcome::Continue(vec![instruction]))
            }

            Phase::Done => Ok(StrategyOutcome::Terminal(ExecuteResponse::default())),
        }
    }
}
