use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::executor::{StepContext, StepExecutor};
use super::planner::Planner;
use super::progress::{ProgressEvent, ProgressSink};
use super::replanner::{ReplanContext, Replanner};
use crate::error::{AgentError, RunFailure};
use crate::types::{Act, Completion, RunOutcome, RunState};

pub const NOTHING_TO_DO_MESSAGE: &str = "There is nothing to do for this request.";
pub const PLAN_EXHAUSTED_MESSAGE: &str = "No more steps in the plan.";

/// Where a run is. Each transition takes the state by value and hands it on.
enum Phase {
    Planning(RunState),
    Executing(RunState),
    Replanning(RunState),
    Terminated {
        state: RunState,
        completion: Completion,
        response: String,
    },
}

/// Drives one objective through plan, execute and replan until it terminates
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    replanner: Arc<dyn Replanner>,
    progress: Arc<dyn ProgressSink>,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        replanner: Arc<dyn Replanner>,
        progress: Arc<dyn ProgressSink>,
        max_iterations: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            replanner,
            progress,
            max_iterations,
        }
    }

    /// Run the state machine for a single objective
    pub async fn run(
        &self,
        objective: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        let state = RunState::new(objective);
        info!(run_id = %state.id(), objective, "starting run");

        let mut phase = Phase::Planning(state);
        loop {
            phase = match phase {
                Phase::Terminated {
                    state,
                    completion,
                    response,
                } => return Ok(self.finish(state, completion, response)),
                Phase::Planning(state)
                | Phase::Executing(state)
                | Phase::Replanning(state)
                    if cancel.is_cancelled() =>
                {
                    return Err(self.fail(state, AgentError::Cancelled));
                }
                Phase::Planning(state) => self.plan(state, cancel).await?,
                Phase::Executing(state) => self.execute(state, cancel).await?,
                Phase::Replanning(state) => self.replan(state, cancel).await?,
            };
        }
    }

    async fn plan(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
    ) -> Result<Phase, RunFailure> {
        info!(run_id = %state.id(), "planning");
        let planned = until_cancelled(cancel, self.planner.plan(state.objective())).await;
        let steps = match planned {
            None => return Err(self.fail(state, AgentError::Cancelled)),
            Some(Err(e)) => return Err(self.fail(state, e)),
            Some(Ok(steps)) => steps,
        };

        if steps.is_empty() {
            info!(run_id = %state.id(), "planner returned no steps");
            return Ok(Phase::Terminated {
                state,
                completion: Completion::NothingToDo,
                response: NOTHING_TO_DO_MESSAGE.to_string(),
            });
        }

        for (i, step) in steps.iter().enumerate() {
            info!(run_id = %state.id(), "  {}. {}", i + 1, step);
        }
        self.progress.emit(ProgressEvent::PlanGenerated {
            run_id: state.id().to_string(),
            steps: steps.clone(),
        });

        state.set_initial_plan(steps);
        Ok(Phase::Executing(state))
    }

    async fn execute(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
    ) -> Result<Phase, RunFailure> {
        let Some(step) = state.pop_next_step() else {
            return Ok(Phase::Terminated {
                state,
                completion: Completion::PlanExhausted,
                response: PLAN_EXHAUSTED_MESSAGE.to_string(),
            });
        };

        let step_number = state.history().len() + 1;
        info!(run_id = %state.id(), step_number, step = %step, "executing step");
        self.progress.emit(ProgressEvent::StepStarted {
            run_id: state.id().to_string(),
            index: step_number,
            step: step.clone(),
        });

        let context = StepContext {
            run_id: state.id().to_string(),
            objective: state.objective().to_string(),
            step_number,
            step: step.clone(),
            upcoming: state.plan().to_vec(),
            history: state.history().to_vec(),
        };
        let Some(output) = until_cancelled(cancel, self.executor.execute(context)).await else {
            return Err(self.fail(state, AgentError::Cancelled));
        };

        self.progress.emit(ProgressEvent::StepCompleted {
            run_id: state.id().to_string(),
            index: step_number,
            step: step.clone(),
            result: output.result.clone(),
        });
        state.record(step, output.result, output.tool_output);
        Ok(Phase::Replanning(state))
    }

    async fn replan(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
    ) -> Result<Phase, RunFailure> {
        let context = ReplanContext {
            run_id: state.id().to_string(),
            objective: state.objective().to_string(),
            original_plan: state.initial_plan().to_vec(),
            remaining_plan: state.plan().to_vec(),
            history: state.history().to_vec(),
            tool_outputs: state.tool_outputs().to_vec(),
        };

        let act = match until_cancelled(cancel, self.replanner.replan(context)).await {
            None => return Err(self.fail(state, AgentError::Cancelled)),
            Some(Err(e)) => return Err(self.fail(state, e)),
            Some(Ok(act)) => act,
        };

        match act {
            Act::Respond(response) => {
                state.set_final_response(response.clone());
                Ok(Phase::Terminated {
                    state,
                    completion: Completion::Answered,
                    response,
                })
            }
            Act::Replan(_) if state.iterations() >= self.max_iterations => {
                let limit = self.max_iterations;
                Err(self.fail(state, AgentError::IterationLimit(limit)))
            }
            Act::Replan(steps) => {
                info!(run_id = %state.id(), remaining = steps.len(), "continuing with revised plan");
                self.progress.emit(ProgressEvent::PlanRevised {
                    run_id: state.id().to_string(),
                    steps: steps.clone(),
                });
                state.replace_plan(steps);
                Ok(Phase::Executing(state))
            }
        }
    }

    fn finish(&self, state: RunState, completion: Completion, response: String) -> RunOutcome {
        info!(
            run_id = %state.id(),
            iterations = state.iterations(),
            ?completion,
            "run finished"
        );
        self.progress.emit(ProgressEvent::FinalResponse {
            run_id: state.id().to_string(),
            response: response.clone(),
        });

        // A replanner answer always wins over the phase's own message
        let response = state
            .final_response()
            .map(str::to_string)
            .unwrap_or(response);
        let run_id = state.id().to_string();
        let iterations = state.iterations();
        RunOutcome {
            run_id,
            response,
            completion,
            history: state.into_history(),
            iterations,
        }
    }

    fn fail(&self, state: RunState, error: AgentError) -> RunFailure {
        error!(run_id = %state.id(), error = %error, "run failed");
        self.progress.emit(ProgressEvent::Failed {
            run_id: state.id().to_string(),
            error: error.to_string(),
        });

        let run_id = state.id().to_string();
        let iterations = state.iterations();
        RunFailure {
            error,
            run_id,
            history: state.into_history(),
            iterations,
        }
    }
}

/// None if the token fires before the future completes
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}
