use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::LlmError;

const MAX_LOG_CHARS: usize = 2_000;

/// Shape the completion service is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
}

impl LlmRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Text,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Json,
        }
    }
}

/// Completion service boundary
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// Run a schema-constrained completion and decode the first JSON object.
pub async fn complete_structured<T: DeserializeOwned>(
    client: &dyn LlmClient,
    request: LlmRequest,
) -> Result<T, LlmError> {
    let response = client.complete(request).await?;
    decode_structured(&response)
}

pub fn decode_structured<T: DeserializeOwned>(response: &str) -> Result<T, LlmError> {
    let json = extract_json_object(response).ok_or_else(|| {
        LlmError::Malformed(format!(
            "no JSON object found in: {}",
            truncate_for_log(response, 200)
        ))
    })?;
    serde_json::from_str(json).map_err(|e| LlmError::Malformed(format!("{}: {}", e, json)))
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub async fn is_available(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .is_ok()
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.user,
            stream: false,
            format: (request.format == ResponseFormat::Json).then_some("json"),
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!(
            model = %self.model,
            prompt = %truncate_for_log(&request.user, MAX_LOG_CHARS),
            "calling completion service"
        );

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Response(format!(
                "status {}: {}",
                status,
                truncate_for_log(&text, 200)
            )));
        }

        let parsed: OllamaResponse = response.json().await?;
        debug!(
            output = %truncate_for_log(&parsed.response, MAX_LOG_CHARS),
            "completion received"
        );
        Ok(parsed.response)
    }
}

/// Find the first balanced `{...}` in model output, skipping braces in strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::closed_endpoint;

    #[derive(Debug, Deserialize)]
    struct Steps {
        steps: Vec<String>,
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let config = LlmConfig {
            base_url: format!("{}/", closed_endpoint()),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(!client.is_available().await);
    }

    #[test]
    fn test_extract_json_with_surrounding_text() {
        let text = "Sure! Here is the plan:\n```json\n{\"steps\":[\"a\",\"b\"]}\n```";
        assert_eq!(extract_json_object(text), Some("{\"steps\":[\"a\",\"b\"]}"));
    }

    #[test]
    fn test_extract_json_ignores_braces_in_strings() {
        let text = r#"{"answer":"use {curly} braces \"}\" freely","n":1} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"answer":"use {curly} braces \"}\" freely","n":1}"#)
        );
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert_eq!(extract_json_object("{\"steps\": [\"a\""), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_decode_structured() {
        let steps: Steps = decode_structured("plan: {\"steps\":[\"one\"]}").unwrap();
        assert_eq!(steps.steps, vec!["one".to_string()]);

        let err = decode_structured::<Steps>("{\"plan\":[]}").unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("abc", 5), "abc");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
    }
}
