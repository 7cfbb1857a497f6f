//! Tool registry: a fixed set of text-in/text-out tools.
//!
//! Tool failures never escape the registry. Errors, timeouts and panics are
//! turned into a [`ToolOutcome`] whose text starts with [`TOOL_ERROR_MARKER`].

pub mod analysis;
pub mod portfolio;
pub mod price;
pub mod responder;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::task::AbortOnDropHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ToolError;
use crate::llm::LlmClient;

pub use analysis::StockAnalyser;
pub use portfolio::PortfolioRetriever;
pub use price::{FinnhubClient, PriceChecker, QuoteSource};
pub use responder::NormalResponder;

pub const TOOL_ERROR_MARKER: &str = "[tool error]";

/// The closed set of capabilities available to the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    PortfolioRetriever,
    PriceChecker,
    StockAnalyser,
    NormalResponder,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::PortfolioRetriever,
        ToolKind::PriceChecker,
        ToolKind::StockAnalyser,
        ToolKind::NormalResponder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::PortfolioRetriever => "portfolio_retriever",
            ToolKind::PriceChecker => "price_checker",
            ToolKind::StockAnalyser => "stock_analyser",
            ToolKind::NormalResponder => "normal_responder",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::PortfolioRetriever => {
                "Retrieves portfolio information, e.g. 100 units of TSLA purchased at an \
                 average price of $200, or the last trade on a stock."
            }
            ToolKind::PriceChecker => {
                "Checks the current price of one or more stocks. Accepts company names or \
                 ticker symbols."
            }
            ToolKind::StockAnalyser => {
                "Analyses stock market trends and news for a stock or the market."
            }
            ToolKind::NormalResponder => {
                "Answers general or non-financial questions, e.g. greetings or who are you."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_matches(|c| c == '{' || c == '}');
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single capability: instruction text in, result text out
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    async fn invoke(&self, input: &str) -> Result<String, ToolError>;
}

/// Result of one tool invocation as seen by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(kind: ToolKind, msg: impl fmt::Display) -> Self {
        Self {
            output: format!("{} {} failed: {}", TOOL_ERROR_MARKER, kind, msg),
            is_error: true,
        }
    }
}

/// Lookup table from tool kind to implementation, built once at startup
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Build the standard tool set from configuration
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>) -> Result<Self, ToolError> {
        let quotes = FinnhubClient::new(&config.tools)?;
        let mut registry = Self::new(config.agent.tool_timeout());
        registry.register(Arc::new(PortfolioRetriever::new(
            llm.clone(),
            config.tools.portfolio_db_path(),
            config.tools.portfolio_max_rows,
        )));
        registry.register(Arc::new(PriceChecker::new(llm.clone(), Arc::new(quotes))));
        registry.register(Arc::new(StockAnalyser::new(llm.clone())));
        registry.register(Arc::new(NormalResponder::new(
            llm,
            &config.agent.persona,
            &config.agent.user_profile,
        )));
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.tools.contains_key(&kind)
    }

    /// Registered tools as `- name: description` lines, in a stable order
    pub fn catalog(&self) -> String {
        ToolKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .map(|kind| format!("- {}: {}", kind.name(), kind.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invoke a tool. Never fails: every failure becomes error text.
    pub async fn invoke(&self, kind: ToolKind, input: &str) -> ToolOutcome {
        let Some(tool) = self.tools.get(&kind).cloned() else {
            return ToolOutcome::error(kind, "tool is not available");
        };

        info!(tool = %kind, "invoking tool");
        let input = input.to_string();
        // Own task so a panic is contained; dropping the caller aborts it
        let mut handle =
            AbortOnDropHandle::new(tokio::spawn(async move { tool.invoke(&input).await }));

        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(output))) => ToolOutcome::success(output),
            Ok(Ok(Err(e))) => ToolOutcome::error(kind, e),
            Ok(Err(join_error)) => ToolOutcome::error(kind, format!("tool crashed: {}", join_error)),
            Err(_) => {
                handle.abort();
                ToolOutcome::error(
                    kind,
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                )
            }
        };

        if outcome.is_error {
            warn!(tool = %kind, output = %outcome.output, "tool failed");
        }
        outcome
    }
}
