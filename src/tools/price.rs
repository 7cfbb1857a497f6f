//! Price lookup: extract ticker symbols from free text, then fetch quotes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Tool, ToolKind};
use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::llm::{LlmClient, LlmRequest};

const QUOTE_TIMEOUT_SECS: u64 = 15;

pub const NO_SYMBOLS_MESSAGE: &str = "No valid stock symbols or company names found in the input.";

/// A point-in-time quote. Fields are optional because upstream data may be partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Quote {
    #[serde(rename = "c")]
    pub current: Option<f64>,
    #[serde(rename = "pc")]
    pub previous_close: Option<f64>,
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError>;
}

/// Finnhub `/quote` endpoint
pub struct FinnhubClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FinnhubClient {
    pub fn new(config: &ToolsConfig) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(QUOTE_TIMEOUT_SECS))
            .build()
            .map_err(|e| ToolError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.finnhub_base_url.trim_end_matches('/').to_string(),
            api_key: config.finnhub_api_key.clone(),
        })
    }
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("FINNHUB_API_KEY is not set".to_string()))?;

        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&[("symbol", symbol), ("token", api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Upstream(format!("quote request returned {}", status)));
        }

        Ok(response.json().await?)
    }
}

pub struct PriceChecker {
    llm: Arc<dyn LlmClient>,
    quotes: Arc<dyn QuoteSource>,
}

impl PriceChecker {
    pub fn new(llm: Arc<dyn LlmClient>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self { llm, quotes }
    }

    async fn extract_symbols(&self, text: &str) -> Result<Vec<String>, ToolError> {
        let response = self
            .llm
            .complete(LlmRequest::text(SYMBOL_SYSTEM_PROMPT, symbol_prompt(text)))
            .await?;
        debug!(output = %response, "symbol extraction output");
        Ok(parse_symbols(&response))
    }
}

#[async_trait]
impl Tool for PriceChecker {
    fn kind(&self) -> ToolKind {
        ToolKind::PriceChecker
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let symbols = self.extract_symbols(input).await?;
        if symbols.is_empty() {
            warn!(input, "no symbols found");
            return Ok(NO_SYMBOLS_MESSAGE.to_string());
        }

        // One line per symbol; a failed symbol does not affect the others
        let mut lines = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let line = match self.quotes.quote(symbol).await {
                Ok(quote) => format_quote(symbol, &quote),
                Err(e) => format!("Could not retrieve price for {}: {}", symbol, e),
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

/// Render a quote, or the reason it cannot be rendered
pub fn format_quote(symbol: &str, quote: &Quote) -> String {
    let current = match quote.current {
        Some(c) if c != 0.0 => c,
        _ => {
            return format!(
                "Could not retrieve price information for {}. Check the ticker symbol.",
                symbol
            )
        }
    };
    let Some(previous_close) = quote.previous_close else {
        return format!("Could not retrieve previous close price for {}.", symbol);
    };

    let change = current - previous_close;
    let percent_change = if previous_close != 0.0 {
        change / previous_close * 100.0
    } else {
        0.0
    };

    format!(
        "{}: Current Price: ${:.2}, Change: ${:.2} ({:.2}%)",
        symbol, current, change, percent_change
    )
}

fn first_json_array(text: &str) -> Option<&str> {
    let re = Regex::new(r"(?s)\[.*?\]").ok()?;
    re.find(text).map(|m| m.as_str())
}

/// Take the first JSON array of strings from model output, upper-cased and de-duplicated
pub fn parse_symbols(output: &str) -> Vec<String> {
    let Some(found) = first_json_array(output) else {
        warn!(output, "no JSON array in symbol extraction output");
        return Vec::new();
    };

    let values: Vec<serde_json::Value> = match serde_json::from_str(found) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, output, "symbol list is not valid JSON");
            return Vec::new();
        }
    };

    let mut symbols: Vec<String> = Vec::new();
    for value in values {
        let Some(symbol) = value.as_str() else {
            continue;
        };
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

const SYMBOL_SYSTEM_PROMPT: &str =
    "You extract stock ticker symbols from text and answer with a JSON array only.";

fn symbol_prompt(text: &str) -> String {
    format!(
        r#"Extract the stock ticker symbols from the given text. If a company name is provided, convert it to its most common ticker symbol. If no symbols or company names are found, return an empty list.

Text: "Get me the prices of Apple and Microsoft."
Symbols: ["AAPL", "MSFT"]

Text: "What about Tesla, Google, and Amazon?"
Symbols: ["TSLA", "GOOG", "AMZN"]

Text: "I want to know about IBM and Berkshire Hathaway."
Symbols: ["IBM", "BRK-B"]

Text: "No stocks here."
Symbols: []

Return ONLY the JSON array. Do not include any other text or code blocks.

Text: "{}"
Symbols:"#,
        text
    )
}
