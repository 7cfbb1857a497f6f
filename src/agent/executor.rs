use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::progress::{ProgressEvent, ProgressSink};
use super::prompts::{self, ToolCallView};
use crate::llm::{extract_json_object, LlmClient, LlmRequest};
use crate::tools::{ToolKind, ToolOutcome, ToolRegistry, TOOL_ERROR_MARKER};
use crate::types::StepRecord;

/// Everything the executor is allowed to see about the run
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: String,
    pub objective: String,
    /// 1-based position of this step among all steps executed in the run
    pub step_number: usize,
    pub step: String,
    /// Steps still pending after this one
    pub upcoming: Vec<String>,
    pub history: Vec<StepRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// The step's answer as recorded in history
    pub result: String,
    /// Raw tool text gathered during the step, or the result if no tool ran
    pub tool_output: String,
}

/// Executes one plan step. Never fails: problems become result text.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, context: StepContext) -> StepOutput;
}

#[derive(Debug, Deserialize)]
struct DecisionWire {
    tool: Option<String>,
    input: Option<String>,
    answer: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Call { tool: String, input: Option<String> },
    Answer(String),
}

struct ToolCall {
    tool: String,
    input: String,
    outcome: ToolOutcome,
}

/// Runs a step as a bounded loop of tool calls driven by the completion service
pub struct ToolExecutor {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    progress: Arc<dyn ProgressSink>,
    max_tool_calls: usize,
    system: String,
}

impl ToolExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        progress: Arc<dyn ProgressSink>,
        max_tool_calls: usize,
        persona: &str,
        user_profile: &str,
    ) -> Self {
        let system = prompts::executor_system_prompt(persona, user_profile, &tools.catalog());
        Self {
            llm,
            tools,
            progress,
            max_tool_calls,
            system,
        }
    }

    async fn call_tool(&self, run_id: &str, name: &str, input: String) -> ToolCall {
        let outcome = match ToolKind::from_name(name) {
            Some(kind) => {
                let outcome = self.tools.invoke(kind, &input).await;
                self.progress.emit(ProgressEvent::ToolInvoked {
                    run_id: run_id.to_string(),
                    tool: kind,
                    input: input.clone(),
                    is_error: outcome.is_error,
                });
                outcome
            }
            None => {
                warn!(tool = %name, "executor asked for an unknown tool");
                ToolOutcome {
                    output: format!("{} unknown tool '{}'", TOOL_ERROR_MARKER, name),
                    is_error: true,
                }
            }
        };
        ToolCall {
            tool: name.to_string(),
            input,
            outcome,
        }
    }
}

#[async_trait]
impl StepExecutor for ToolExecutor {
    async fn execute(&self, context: StepContext) -> StepOutput {
        let mut plan = vec![context.step.clone()];
        plan.extend(context.upcoming.iter().cloned());
        let plan = prompts::numbered(&plan, context.step_number);

        let mut calls: Vec<ToolCall> = Vec::new();

        let answer = loop {
            let remaining = self.max_tool_calls.saturating_sub(calls.len());
            let views: Vec<ToolCallView<'_>> = calls
                .iter()
                .map(|call| ToolCallView {
                    tool: &call.tool,
                    input: &call.input,
                    output: &call.outcome.output,
                })
                .collect();
            let prompt = prompts::executor_step_prompt(
                &plan,
                context.step_number,
                &context.step,
                &context.history,
                &views,
                remaining,
            );

            let response = match self
                .llm
                .complete(LlmRequest::json(self.system.clone(), prompt))
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(run_id = %context.run_id, error = %e, "executor call failed");
                    break fallback_answer(&calls)
                        .unwrap_or_else(|| format!("Could not complete this step: {}", e));
                }
            };
            debug!(output = %response, "executor decision");

            match parse_decision(&response) {
                Decision::Answer(answer) => break answer,
                Decision::Call { tool, .. } if remaining == 0 => {
                    info!(tool = %tool, "tool budget exhausted, forcing answer");
                    break fallback_answer(&calls).unwrap_or_default();
                }
                Decision::Call { tool, input } => {
                    let input = input.unwrap_or_else(|| context.step.clone());
                    let call = self.call_tool(&context.run_id, &tool, input).await;
                    calls.push(call);
                }
            }
        };

        let tool_output = fallback_answer(&calls);
        let result = if answer.trim().is_empty() {
            tool_output
                .clone()
                .unwrap_or_else(|| "No result was produced for this step.".to_string())
        } else {
            answer.trim().to_string()
        };

        StepOutput {
            tool_output: tool_output.unwrap_or_else(|| result.clone()),
            result,
        }
    }
}

/// Concatenated tool outputs, if any tool ran
fn fallback_answer(calls: &[ToolCall]) -> Option<String> {
    if calls.is_empty() {
        return None;
    }
    Some(
        calls
            .iter()
            .map(|call| call.outcome.output.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Decode `{"tool":..,"input":..}` or `{"answer":..}`. Anything else is taken as the answer.
fn parse_decision(response: &str) -> Decision {
    let wire = extract_json_object(response)
        .and_then(|json| serde_json::from_str::<DecisionWire>(json).ok());

    match wire {
        Some(DecisionWire {
            answer: Some(answer),
            ..
        }) => Decision::Answer(answer),
        Some(DecisionWire {
            tool: Some(tool),
            input,
            ..
        }) if !tool.trim().is_empty() => Decision::Call {
            tool: tool.trim().to_string(),
            input,
        },
        _ => Decision::Answer(response.trim().to_string()),
    }
}
