use thiserror::Error;

use crate::types::StepRecord;

/// Completion service errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("response error: {0}")]
    Response(String),
    #[error("malformed structured output: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::Response(err.to_string())
        } else {
            LlmError::Http(err.to_string())
        }
    }
}

/// Errors raised inside a tool. The registry turns these into result text.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Upstream(err.to_string())
    }
}

/// Orchestration-level failures. All of these end the run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("planning failed: {0}")]
    Planning(String),
    #[error("replanner output was neither a response nor a plan: {0}")]
    ReplanParse(String),
    #[error("could not complete the request within {0} iterations")]
    IterationLimit(usize),
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A failed run. Completed steps are kept so nothing gathered is lost.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: AgentError,
    pub run_id: String,
    pub history: Vec<StepRecord>,
    pub iterations: usize,
}

impl RunFailure {
    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match &self.error {
            AgentError::IterationLimit(_) => {
                "Sorry, I could not complete your request. Please try rephrasing it.".to_string()
            }
            AgentError::Cancelled => "The request was cancelled.".to_string(),
            _ => "Sorry, something went wrong while working on your request.".to_string(),
        }
    }
}

/// Errors building the assistant from configuration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("completion service: {0}")]
    Llm(#[from] LlmError),
    #[error("tools: {0}")]
    Tools(#[from] ToolError),
}
