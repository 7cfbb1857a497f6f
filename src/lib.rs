pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod tools;
pub mod types;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agent::{LlmPlanner, LlmReplanner, Orchestrator, ProgressSink, ToolExecutor};
use config::Config;
use error::{RunFailure, SetupError};
use llm::{LlmClient, OllamaClient};
use tools::ToolRegistry;
use types::RunOutcome;

/// The assembled assistant: shared clients and tools plus the orchestrator
/// that drives each turn. Independent turns may run concurrently.
pub struct Assistant {
    orchestrator: Orchestrator,
}

impl Assistant {
    /// Build against the configured Ollama-compatible endpoint.
    /// An unreachable endpoint is logged, not fatal: it may come up later.
    pub async fn from_config(
        config: &Config,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, SetupError> {
        let client = OllamaClient::new(&config.llm)?;
        if !client.is_available().await {
            warn!(base_url = %config.llm.base_url, "completion service is not reachable");
        }
        let llm: Arc<dyn LlmClient> = Arc::new(client);
        Self::with_llm(config, llm, progress)
    }

    pub fn with_llm(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self, SetupError> {
        let registry = Arc::new(ToolRegistry::from_config(config, llm.clone())?);
        info!(model = %config.llm.model, "tools registered:\n{}", registry.catalog());

        let planner = LlmPlanner::new(llm.clone(), registry.catalog());
        let executor = ToolExecutor::new(
            llm.clone(),
            registry,
            progress.clone(),
            config.agent.max_tool_calls_per_step,
            &config.agent.persona,
            &config.agent.user_profile,
        );
        let replanner = LlmReplanner::new(llm);

        Ok(Self {
            orchestrator: Orchestrator::new(
                Arc::new(planner),
                Arc::new(executor),
                Arc::new(replanner),
                progress,
                config.agent.max_iterations,
            ),
        })
    }

    /// Answer one objective. Cancelling the token abandons the turn.
    pub async fn ask(
        &self,
        objective: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        self.orchestrator.run(objective, cancel).await
    }
}
