//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, ToolError};
use crate::llm::{LlmClient, LlmRequest};
use crate::tools::price::{Quote, QuoteSource};
use crate::tools::{Tool, ToolKind};

/// Completion service that replays canned responses in order
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_error(self, error: LlmError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Response("script exhausted".to_string())))
    }
}

/// Tool that always returns the same text and records its inputs
pub struct StaticTool {
    kind: ToolKind,
    reply: String,
    inputs: Mutex<Vec<String>>,
}

impl StaticTool {
    pub fn new(kind: ToolKind, reply: impl Into<String>) -> Self {
        Self {
            kind,
            reply: reply.into(),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        self.inputs.lock().unwrap().push(input.to_string());
        Ok(self.reply.clone())
    }
}

pub struct FailingTool {
    kind: ToolKind,
    message: String,
}

impl FailingTool {
    pub fn new(kind: ToolKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        Err(ToolError::Upstream(self.message.clone()))
    }
}

pub struct PanickingTool {
    kind: ToolKind,
}

impl PanickingTool {
    pub fn new(kind: ToolKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Tool for PanickingTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        panic!("tool exploded");
    }
}

/// Sleeps before answering and records whether it got that far
pub struct SlowTool {
    kind: ToolKind,
    delay: Duration,
    finished: AtomicBool,
}

impl SlowTool {
    pub fn new(kind: ToolKind, delay: Duration) -> Self {
        Self {
            kind,
            delay,
            finished: AtomicBool::new(false),
        }
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok("late".to_string())
    }
}

/// Quote source backed by a fixed table
#[derive(Default)]
pub struct StaticQuotes {
    quotes: HashMap<String, Result<Quote, String>>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, symbol: &str, current: f64, previous_close: f64) -> Self {
        self.quotes.insert(
            symbol.to_string(),
            Ok(Quote {
                current: Some(current),
                previous_close: Some(previous_close),
            }),
        );
        self
    }

    pub fn with_error(mut self, symbol: &str, message: &str) -> Self {
        self.quotes
            .insert(symbol.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError> {
        match self.quotes.get(symbol) {
            Some(Ok(quote)) => Ok(*quote),
            Some(Err(message)) => Err(ToolError::Upstream(message.clone())),
            None => Ok(Quote::default()),
        }
    }
}

/// A local address with nothing listening on it
pub fn closed_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
