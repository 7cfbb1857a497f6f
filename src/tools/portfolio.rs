//! Portfolio lookup over SQL.
//!
//! The completion service writes a single SQL statement against the local
//! `holdings` table. SQLite refuses anything that is not read-only, and the
//! rows are then summarised back into prose.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Tool, ToolKind};
use crate::error::ToolError;
use crate::llm::{LlmClient, LlmRequest};

pub struct PortfolioRetriever {
    llm: Arc<dyn LlmClient>,
    db_path: PathBuf,
    max_rows: usize,
}

impl PortfolioRetriever {
    pub fn new(llm: Arc<dyn LlmClient>, db_path: PathBuf, max_rows: usize) -> Self {
        Self {
            llm,
            db_path,
            max_rows,
        }
    }

    async fn generate_sql(&self, question: &str) -> Result<String, ToolError> {
        let raw = self
            .llm
            .complete(LlmRequest::text(SQL_SYSTEM_PROMPT, sql_prompt(question)))
            .await?;
        let sql = clean_sql(&raw);
        debug!(sql = %sql, "generated portfolio query");
        Ok(sql)
    }

    async fn run_query(&self, sql: String) -> Result<Vec<Map<String, Value>>, ToolError> {
        let path = self.db_path.clone();
        let max_rows = self.max_rows;
        tokio::task::spawn_blocking(move || query_rows(&path, &sql, max_rows))
            .await
            .map_err(|e| ToolError::Upstream(format!("query task failed: {}", e)))?
    }
}

#[async_trait]
impl Tool for PortfolioRetriever {
    fn kind(&self) -> ToolKind {
        ToolKind::PortfolioRetriever
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        if !self.db_path.exists() {
            return Err(ToolError::NotConfigured(format!(
                "portfolio database not found at {}",
                self.db_path.display()
            )));
        }

        let sql = self.generate_sql(input).await?;
        let rows = self.run_query(sql).await?;
        info!(rows = rows.len(), "portfolio query returned");

        let results = serde_json::to_string(&rows)
            .map_err(|e| ToolError::Upstream(format!("could not encode rows: {}", e)))?;
        let summary = self
            .llm
            .complete(LlmRequest::text(
                SUMMARY_SYSTEM_PROMPT,
                format!(
                    "Generate a natural language response based on the original question: '{}' \
                     and the returned results: '{}'",
                    input, results
                ),
            ))
            .await?;
        Ok(summary.trim().to_string())
    }
}

/// Strip code fences and line breaks the model tends to add around SQL
pub fn clean_sql(raw: &str) -> String {
    let sql = raw
        .replace("```sql", "")
        .replace("```", "")
        .replace("\\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('\\', "");
    let sql = sql.trim().trim_end_matches(';').trim();
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn query_rows(path: &Path, sql: &str, max_rows: usize) -> Result<Vec<Map<String, Value>>, ToolError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    // Trailing statements make prepare fail, so only this one can run
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(ToolError::InvalidInput(format!(
            "only read-only queries are allowed, got: {}",
            sql
        )));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            break;
        }
        let mut record = Map::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

const SQL_SYSTEM_PROMPT: &str = "You are an SQLite SQL expert working in the investment \
industry. You answer with a single SQL query and nothing else.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarise portfolio query results for an investor, concisely and accurately.";

fn sql_prompt(question: &str) -> String {
    format!(
        r#"Write one SQLite query that answers the question using the schema below.

Guidelines:
- Generate SELECT queries ONLY.
- Use ONLY the column names listed in the schema.
- CAST values before applying aggregate functions when types may differ.
- Put every non-aggregated selected column in GROUP BY.
- Do not include comments or code fences. Output the SQL on a single line.

Table `holdings`:
| column | type | description |
|---|---|---|
| symbol | TEXT | Stock symbol (e.g. AAPL, GOOG) |
| company_name | TEXT | Name of the company |
| quantity | INTEGER | Number of shares held |
| purchase_price | REAL | Purchase price per share |
| purchase_date | TEXT | Date the shares were purchased (YYYY-MM-DD) |
| currency | TEXT | Currency of the holding |

Example question: What do I have in my portfolio?
Example query: SELECT symbol, company_name, quantity, purchase_price, purchase_date FROM holdings

Question: {}
Query:"#,
        question
    )
}
