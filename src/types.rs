use serde::{Deserialize, Serialize};

/// A completed step and the text it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub result: String,
}

/// Mutable state of a single run. Owned by the orchestrator for one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    id: String,
    objective: String,
    initial_plan: Vec<String>,
    plan: Vec<String>,
    history: Vec<StepRecord>,
    tool_outputs: Vec<String>,
    final_response: Option<String>,
    iterations: usize,
}

impl RunState {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            objective: objective.into(),
            initial_plan: Vec::new(),
            plan: Vec::new(),
            history: Vec::new(),
            tool_outputs: Vec::new(),
            final_response: None,
            iterations: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// The plan as first produced by the planner
    pub fn initial_plan(&self) -> &[String] {
        &self.initial_plan
    }

    /// Steps still pending, in execution order
    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn tool_outputs(&self) -> &[String] {
        &self.tool_outputs
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    /// Execute/replan cycles completed so far
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn into_history(self) -> Vec<StepRecord> {
        self.history
    }

    pub(crate) fn set_initial_plan(&mut self, steps: Vec<String>) {
        self.initial_plan = steps.clone();
        self.plan = steps;
    }

    /// Remove the next pending step. It must be recorded before the next pop.
    pub(crate) fn pop_next_step(&mut self) -> Option<String> {
        if self.plan.is_empty() {
            None
        } else {
            Some(self.plan.remove(0))
        }
    }

    pub(crate) fn record(&mut self, step: String, result: String, tool_output: String) {
        self.history.push(StepRecord { step, result });
        self.tool_outputs.push(tool_output);
        self.iterations += 1;
    }

    pub(crate) fn replace_plan(&mut self, steps: Vec<String>) {
        self.plan = steps;
    }

    /// Returns false if a final response was already set; the first one wins.
    pub(crate) fn set_final_response(&mut self, response: String) -> bool {
        if self.final_response.is_some() {
            return false;
        }
        self.final_response = Some(response);
        true
    }
}

/// Decision returned by the replanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Act {
    Respond(String),
    Replan(Vec<String>),
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The replanner produced a final response
    Answered,
    /// The planner returned no steps
    NothingToDo,
    /// The replanner left no steps and gave no response
    PlanExhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub response: String,
    pub completion: Completion,
    pub history: Vec<StepRecord>,
    pub iterations: usize,
}
