//! Falcon - plan-execute-replan financial assistant
//!
//! `falcon ask "<question>"` answers one question; `falcon chat` starts a
//! prompt where every line is an independent turn. Progress goes to stderr,
//! answers go to stdout.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use falcon_lib::agent::{ChannelSink, ProgressEvent};
use falcon_lib::config::load_config;
use falcon_lib::error::RunFailure;
use falcon_lib::types::RunOutcome;
use falcon_lib::Assistant;

/// Falcon - financial assistant
#[derive(Parser)]
#[command(name = "falcon")]
#[command(about = "Plan-execute-replan financial assistant", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/falcon/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the execute/replan cycle cap
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Print each outcome as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit
    Ask {
        /// The question or instruction
        objective: String,
    },
    /// Interactive session. Ctrl-C cancels the current turn, or exits when idle.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(max_iterations) = cli.max_iterations {
        if max_iterations == 0 {
            anyhow::bail!("--max-iterations must be greater than 0");
        }
        config.agent.max_iterations = max_iterations;
    }

    let (sink, events) = ChannelSink::new();
    tokio::spawn(print_progress(events));

    let assistant = Assistant::from_config(&config, Arc::new(sink))
        .await
        .context("failed to build the assistant")?;

    match cli.command {
        Commands::Ask { objective } => {
            let result = assistant.ask(&objective, &CancellationToken::new()).await;
            print_result(&result, cli.json)?;
            if let Err(failure) = result {
                return Err(failure.into());
            }
        }
        Commands::Chat => chat(&assistant, cli.json).await?,
    }

    Ok(())
}

async fn chat(assistant: &Assistant, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = next_line_or_interrupt(&mut lines, tokio::signal::ctrl_c()).await? else {
            stdout.write_all(b"\n").await?;
            break;
        };
        let objective = line.trim();
        if objective.is_empty() {
            continue;
        }
        if matches!(objective, "exit" | "quit") {
            break;
        }

        let token = CancellationToken::new();
        let run = assistant.ask(objective, &token);
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("cancelling current turn");
                token.cancel();
                run.await
            }
        };
        print_result(&result, json)?;
    }

    Ok(())
}

/// Next prompt line, or `None` at end of input or once `interrupt` fires.
/// An interrupt that fails to install is ignored.
async fn next_line_or_interrupt<R, F>(
    lines: &mut Lines<R>,
    interrupt: F,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => line,
        Ok(()) = interrupt => Ok(None),
    }
}

fn print_result(result: &Result<RunOutcome, RunFailure>, json: bool) -> Result<()> {
    match (result, json) {
        (Ok(outcome), true) => println!("{}", serde_json::to_string_pretty(outcome)?),
        (Ok(outcome), false) => println!("{}", outcome.response),
        (Err(failure), true) => {
            let body = serde_json::json!({
                "run_id": failure.run_id,
                "error": failure.error.to_string(),
                "message": failure.user_message(),
                "history": failure.history,
                "iterations": failure.iterations,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        (Err(failure), false) => println!("{}", failure.user_message()),
    }
    Ok(())
}

async fn print_progress(mut events: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::PlanGenerated { steps, .. } => {
                eprintln!("[plan]");
                for (i, step) in steps.iter().enumerate() {
                    eprintln!("  {}. {}", i + 1, step);
                }
            }
            ProgressEvent::StepStarted { index, step, .. } => {
                eprintln!("[step {}] {}", index, step);
            }
            ProgressEvent::ToolInvoked {
                tool,
                input,
                is_error,
                ..
            } => {
                let status = if is_error { "failed" } else { "ok" };
                eprintln!("  [tool] {}(\"{}\") -> {}", tool, input, status);
            }
            ProgressEvent::StepCompleted { index, result, .. } => {
                eprintln!("[step {} done] {}", index, result);
            }
            ProgressEvent::PlanRevised { steps, .. } => {
                eprintln!("[replan] {} step(s) remaining", steps.len());
            }
            ProgressEvent::FinalResponse { .. } => {}
            ProgressEvent::Failed { error, .. } => eprintln!("[failed] {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_ends_idle_prompt() {
        // Writer stays open so the read would otherwise wait forever
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let line = next_line_or_interrupt(&mut lines, async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_prompt_reads_lines_until_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"price of AAPL\n").await.unwrap();
        drop(writer);
        let mut lines = BufReader::new(reader).lines();

        let never = std::future::pending::<std::io::Result<()>>;
        let first = next_line_or_interrupt(&mut lines, never()).await.unwrap();
        assert_eq!(first.as_deref(), Some("price of AAPL"));
        let second = next_line_or_interrupt(&mut lines, never()).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_failed_interrupt_does_not_end_prompt() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"hello\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();

        let broken = async { Err(std::io::Error::other("no signal handler")) };
        let line = next_line_or_interrupt(&mut lines, broken).await.unwrap();
        assert_eq!(line.as_deref(), Some("hello"));
    }
}
