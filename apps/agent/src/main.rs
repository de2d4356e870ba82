//! Check-in agent: scans secrets from stdin against the configured event
//! and check-in list, syncing with the remote in the background.

mod commands;
mod config;
mod context;
mod runtime;

use std::sync::Arc;

use anyhow::Context as _;
use log::{error, info, warn};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;
use crate::context::AgentContext;

const DEFAULT_LOG_FILTER: &str = "checkin_agent=info,checkin_core=info";

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Logs go to stderr; stdout carries results only.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AgentConfig::from_env().context("invalid configuration")?;
    info!(
        "[Agent] Starting for {}/{} list {}",
        config.endpoint.organizer, config.endpoint.event, config.list_id
    );
    let context = Arc::new(AgentContext::build(config).await?);
    info!("[Agent] Validation mode {:?}", context.validator.mode());

    let event_log = runtime::spawn_event_logger(context.events.subscribe());
    let background = runtime::spawn_background_sync(Arc::clone(&context));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("[Agent] Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let output = match commands::parse_command(&line) {
            None => continue,
            Some(Err(err)) => json!({ "error": err.0 }),
            Some(Ok(command)) => match commands::execute(&context, command).await {
                Ok(value) => value,
                Err(err) => {
                    warn!("[Agent] Command failed: {}", err);
                    json!({ "error": err.to_string() })
                }
            },
        };
        let mut rendered = output.to_string();
        rendered.push('\n');
        if let Err(err) = stdout.write_all(rendered.as_bytes()).await {
            error!("[Agent] Failed to write output: {}", err);
            break;
        }
        stdout.flush().await?;
    }

    // Stop between pages; the cursor resumes on next start.
    context.sync.cancel();
    background.abort();
    event_log.abort();
    info!("[Agent] Stopped");
    Ok(())
}
