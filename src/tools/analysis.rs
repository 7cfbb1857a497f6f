use std::sync::Arc;

use async_trait::async_trait;

use super::{Tool, ToolKind};
use crate::error::ToolError;
use crate::llm::{LlmClient, LlmRequest};

const ANALYST_SYSTEM_PROMPT: &str = "You are a seasoned equity analyst. When asked about a \
stock or option, use the most relevant recent news and market context you know of to judge \
whether it is a good time to buy more, hold, or sell. Return a comprehensive analysis targeted \
at the given stock or option and explain the evidence behind it. Do not add disclaimers about \
this not being financial advice.";

/// Market and equity analysis
pub struct StockAnalyser {
    llm: Arc<dyn LlmClient>,
}

impl StockAnalyser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for StockAnalyser {
    fn kind(&self) -> ToolKind {
        ToolKind::StockAnalyser
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        if input.trim().is_empty() {
            return Err(ToolError::InvalidInput("nothing to analyse".to_string()));
        }
        let analysis = self
            .llm
            .complete(LlmRequest::text(ANALYST_SYSTEM_PROMPT, input))
            .await?;
        Ok(analysis.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    #[tokio::test]
    async fn test_analysis_passes_question_through() {
        let llm = Arc::new(ScriptedLlm::new(["  NVDA looks strong.  "]));
        let tool = StockAnalyser::new(llm.clone());

        let output = tool.invoke("Is Nvidia a buy?").await.unwrap();
        assert_eq!(output, "NVDA looks strong.");
        assert_eq!(llm.requests()[0].user, "Is Nvidia a buy?");
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<&str>::new()));
        let tool = StockAnalyser::new(llm);
        assert!(matches!(
            tool.invoke("   ").await,
            Err(ToolError::InvalidInput(_))
        ));
    }
}
