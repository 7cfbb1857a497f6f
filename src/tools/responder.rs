use std::sync::Arc;

use async_trait::async_trait;

use super::{Tool, ToolKind};
use crate::error::ToolError;
use crate::llm::{LlmClient, LlmRequest};

/// Generic questions and small talk, answered in the assistant's persona
pub struct NormalResponder {
    llm: Arc<dyn LlmClient>,
    system: String,
}

impl NormalResponder {
    pub fn new(llm: Arc<dyn LlmClient>, persona: &str, user_profile: &str) -> Self {
        let system = format!(
            "{}\nAnswer the user's question with a comprehensive answer based on what you know, \
             and explain how you came up with it.\n{}",
            persona.trim(),
            user_profile.trim()
        );
        Self { llm, system }
    }
}

#[async_trait]
impl Tool for NormalResponder {
    fn kind(&self) -> ToolKind {
        ToolKind::NormalResponder
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let answer = self
            .llm
            .complete(LlmRequest::text(self.system.clone(), input))
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    #[tokio::test]
    async fn test_persona_in_system_prompt() {
        let llm = Arc::new(ScriptedLlm::new(["Hello! I am Falcon."]));
        let tool = NormalResponder::new(llm.clone(), "You are Falcon.", "The user trades daily.");

        assert_eq!(tool.invoke("Hi").await.unwrap(), "Hello! I am Falcon.");
        let request = &llm.requests()[0];
        assert!(request.system.starts_with("You are Falcon."));
        assert!(request.system.ends_with("The user trades daily."));
    }
}
