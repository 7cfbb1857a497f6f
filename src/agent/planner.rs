use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::prompts;
use crate::error::AgentError;
use crate::llm::{decode_structured, extract_json_object, LlmClient, LlmRequest};

/// Turns an objective into an ordered list of step descriptions.
/// An empty list means there is nothing to do.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, objective: &str) -> Result<Vec<String>, AgentError>;
}

#[derive(Debug, Deserialize)]
struct PlanWire {
    steps: Vec<String>,
}

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    tool_catalog: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, tool_catalog: String) -> Self {
        Self { llm, tool_catalog }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, objective: &str) -> Result<Vec<String>, AgentError> {
        let request = LlmRequest::json(
            prompts::planner_system_prompt(&self.tool_catalog),
            prompts::planner_user_prompt(objective),
        );
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| AgentError::Planning(e.to_string()))?;
        debug!(output = %response, "planner output");

        let steps = parse_plan(&response)?;
        info!(steps = steps.len(), "plan created");
        Ok(steps)
    }
}

/// Parse `{"steps": [...]}`, falling back to a numbered list.
pub fn parse_plan(response: &str) -> Result<Vec<String>, AgentError> {
    if extract_json_object(response).is_some() {
        let wire: PlanWire = decode_structured(response)
            .map_err(|e| AgentError::Planning(format!("unparsable plan: {}", e)))?;
        return normalize_steps(wire.steps);
    }

    let numbered = Regex::new(r"^\s*(?:\d+[.)]|[-*])\s*(.+)$")
        .map_err(|e| AgentError::Planning(format!("Regex error: {}", e)))?;
    let steps: Vec<String> = response
        .lines()
        .filter_map(|line| numbered.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if steps.is_empty() {
        return Err(AgentError::Planning(format!(
            "could not parse a plan from: {}",
            response.trim()
        )));
    }
    normalize_steps(steps)
}

/// Trim steps, strip "Step N:" prefixes, drop blanks
fn normalize_steps(steps: Vec<String>) -> Result<Vec<String>, AgentError> {
    let prefix = Regex::new(r"(?i)^step\s*\d+\s*[:.)-]\s*")
        .map_err(|e| AgentError::Planning(format!("Regex error: {}", e)))?;
    Ok(steps
        .into_iter()
        .map(|step| prefix.replace(step.trim(), "").trim().to_string())
        .filter(|step| !step.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    #[test]
    fn test_parse_json_plan() {
        let steps = parse_plan(r#"{"steps":["Step 1: Check NVDA holdings","  Check NVDA price "]}"#)
            .unwrap();
        assert_eq!(steps, vec!["Check NVDA holdings", "Check NVDA price"]);
    }

    #[test]
    fn test_parse_numbered_fallback() {
        let steps = parse_plan("Plan:\n1. Check AAPL price\n2) Check MSFT price\n").unwrap();
        assert_eq!(steps, vec!["Check AAPL price", "Check MSFT price"]);
    }

    #[test]
    fn test_empty_plan_is_not_an_error() {
        assert!(parse_plan(r#"{"steps":[]}"#).unwrap().is_empty());
        assert!(parse_plan(r#"{"steps":["  "]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_unparsable_plan() {
        assert!(matches!(
            parse_plan("I cannot help with that."),
            Err(AgentError::Planning(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"plan": "nope"}"#),
            Err(AgentError::Planning(_))
        ));
    }

    #[tokio::test]
    async fn test_planner_requests_json() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"steps":["Retrieve the portfolio holdings using the portfolio_retriever tool"]}"#,
        ]));
        let planner = LlmPlanner::new(llm.clone(), "- portfolio_retriever: holdings".into());

        let steps = planner.plan("What's my portfolio?").await.unwrap();
        assert_eq!(steps.len(), 1);

        let request = &llm.requests()[0];
        assert_eq!(request.format, crate::llm::ResponseFormat::Json);
        assert!(request.system.contains("- portfolio_retriever: holdings"));
        assert_eq!(request.user, "Objective: What's my portfolio?");
    }

    #[tokio::test]
    async fn test_llm_failure_is_planning_failure() {
        let llm = Arc::new(
            ScriptedLlm::new(Vec::<&str>::new()).then_error(crate::error::LlmError::Timeout),
        );
        let planner = LlmPlanner::new(llm, String::new());
        assert!(matches!(
            planner.plan("anything").await,
            Err(AgentError::Planning(_))
        ));
    }
}
