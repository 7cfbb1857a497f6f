use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::prompts;
use crate::error::{AgentError, LlmError};
use crate::llm::{complete_structured, decode_structured, LlmClient, LlmRequest};
use crate::types::{Act, StepRecord};

/// What the replanner sees after each executed step
#[derive(Debug, Clone)]
pub struct ReplanContext {
    pub run_id: String,
    pub objective: String,
    pub original_plan: Vec<String>,
    pub remaining_plan: Vec<String>,
    pub history: Vec<StepRecord>,
    pub tool_outputs: Vec<String>,
}

/// Decides after each step whether to answer or continue with a new plan
#[async_trait]
pub trait Replanner: Send + Sync {
    async fn replan(&self, context: ReplanContext) -> Result<Act, AgentError>;
}

/// `response` is accepted as a bare string or as `{"response": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseWire {
    Text(String),
    Nested { response: String },
}

#[derive(Debug, Deserialize)]
struct PlanWire {
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ActWire {
    response: Option<ResponseWire>,
    plan: Option<PlanWire>,
}

pub struct LlmReplanner {
    llm: Arc<dyn LlmClient>,
}

impl LlmReplanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Replanner for LlmReplanner {
    async fn replan(&self, context: ReplanContext) -> Result<Act, AgentError> {
        let request = LlmRequest::json(
            prompts::replanner_system_prompt(),
            prompts::replanner_user_prompt(
                &context.objective,
                &context.original_plan,
                &context.history,
                &context.tool_outputs,
            ),
        );
        let wire: ActWire = complete_structured(&*self.llm, request)
            .await
            .map_err(replan_error)?;
        debug!(run_id = %context.run_id, ?wire, "replanner output");

        match act_from_wire(wire)? {
            Act::Respond(text) => Ok(Act::Respond(clean_newlines(&text))),
            Act::Replan(steps) => {
                let steps = drop_completed(steps, &context.history);
                info!(run_id = %context.run_id, steps = steps.len(), "plan revised");
                Ok(Act::Replan(steps))
            }
        }
    }
}

/// Exactly one of `response` or `plan` must be present.
pub fn parse_act(response: &str) -> Result<Act, AgentError> {
    decode_structured::<ActWire>(response)
        .map_err(replan_error)
        .and_then(act_from_wire)
}

/// Output that does not fit the union is a replanning failure, not a transport one
fn replan_error(error: LlmError) -> AgentError {
    match error {
        LlmError::Malformed(msg) => AgentError::ReplanParse(msg),
        other => AgentError::Llm(other),
    }
}

fn act_from_wire(wire: ActWire) -> Result<Act, AgentError> {
    match (wire.response, wire.plan) {
        (Some(ResponseWire::Text(text)), None)
        | (Some(ResponseWire::Nested { response: text }), None) => Ok(Act::Respond(text)),
        (None, Some(plan)) => Ok(Act::Replan(
            plan.steps
                .into_iter()
                .map(|step| step.trim().to_string())
                .filter(|step| !step.is_empty())
                .collect(),
        )),
        (Some(_), Some(_)) => Err(AgentError::ReplanParse(
            "both a response and a plan were returned".to_string(),
        )),
        (None, None) => Err(AgentError::ReplanParse(
            "neither a response nor a plan was returned".to_string(),
        )),
    }
}

fn drop_completed(steps: Vec<String>, history: &[StepRecord]) -> Vec<String> {
    steps
        .into_iter()
        .filter(|step| !history.iter().any(|done| done.step.eq_ignore_ascii_case(step)))
        .collect()
}

/// Collapse runs of blank lines into one and trim the ends.
pub fn clean_newlines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.trim().lines() {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(line);
        previous_blank = blank;
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    fn context() -> ReplanContext {
        ReplanContext {
            run_id: "run".into(),
            objective: "Prices of AAPL and MSFT".into(),
            original_plan: vec!["Check AAPL".into(), "Check MSFT".into()],
            remaining_plan: vec!["Check MSFT".into()],
            history: vec![StepRecord {
                step: "Check AAPL".into(),
                result: "AAPL is $190".into(),
            }],
            tool_outputs: vec!["AAPL: Current Price: $190.00".into()],
        }
    }

    #[test]
    fn test_parse_response_shapes() {
        assert_eq!(
            parse_act(r#"{"response":"Done."}"#).unwrap(),
            Act::Respond("Done.".into())
        );
        assert_eq!(
            parse_act(r#"{"response":{"response":"Nested."}}"#).unwrap(),
            Act::Respond("Nested.".into())
        );
        assert_eq!(
            parse_act(r#"{"plan":{"steps":["Check MSFT"," "]}}"#).unwrap(),
            Act::Replan(vec!["Check MSFT".into()])
        );
    }

    #[test]
    fn test_both_or_neither_rejected() {
        assert!(matches!(
            parse_act(r#"{"response":"x","plan":{"steps":["y"]}}"#),
            Err(AgentError::ReplanParse(_))
        ));
        assert!(matches!(
            parse_act(r#"{"thoughts":"hmm"}"#),
            Err(AgentError::ReplanParse(_))
        ));
        assert!(matches!(
            parse_act("I think we are done"),
            Err(AgentError::ReplanParse(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_a_parse_failure() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<&str>::new()).then_error(LlmError::Timeout));
        let replanner = LlmReplanner::new(llm);
        assert!(matches!(
            replanner.replan(context()).await,
            Err(AgentError::Llm(LlmError::Timeout))
        ));
    }

    #[test]
    fn test_clean_newlines() {
        let cleaned = clean_newlines("\n\nAAPL: $190\n\n\n\nMSFT: $410  \n\n");
        assert_eq!(cleaned, "AAPL: $190\n\nMSFT: $410");
        assert_eq!(clean_newlines(&cleaned), cleaned);
        assert_eq!(clean_newlines(""), "");
    }

    #[tokio::test]
    async fn test_replan_drops_completed_steps() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"plan":{"steps":["check aapl","Check MSFT"]}}"#,
        ]));
        let replanner = LlmReplanner::new(llm.clone());

        let act = replanner.replan(context()).await.unwrap();
        assert_eq!(act, Act::Replan(vec!["Check MSFT".into()]));

        let request = &llm.requests()[0];
        assert!(request.user.contains("Check AAPL: AAPL is $190"));
        assert!(request.user.contains("AAPL: Current Price: $190.00"));
    }

    #[tokio::test]
    async fn test_response_is_cleaned() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"response":"AAPL is $190.\n\n\n\nMSFT is $410.\n"}"#,
        ]));
        let replanner = LlmReplanner::new(llm);

        let act = replanner.replan(context()).await.unwrap();
        assert_eq!(act, Act::Respond("AAPL is $190.\n\nMSFT is $410.".into()));
    }
}
