// ABOUTME: tasklink-agent binary - registers an echo handler and streams tasks from the coordinator
// ABOUTME: Runs until Ctrl-C, then cleans up the connection manager

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::json;
use tasklink_sdk::{handler_fn, init_agent, init_chatbot, SdkConfig, TaskHandler, TaskKind};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "tasklink-agent")]
#[command(about = "Echo worker - receives tasks from a tasklink coordinator")]
struct Cli {
    /// Process identity sent with the task stream request
    #[arg(env = "TASKLINK_IDENTITY")]
    identity: Option<String>,

    /// Coordinator address (overrides gateway.url from the config file)
    #[arg(short, long, env = "TASKLINK_SERVER")]
    server: Option<String>,

    /// Load configuration from a file (default: ~/.config/tasklink/agent.toml)
    #[arg(short, long, env = "TASKLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Handle chatbot tasks instead of agent tasks
    #[arg(long)]
    chatbot: bool,

    /// Debug-level logging for tasklink crates
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn kind(&self) -> TaskKind {
        if self.chatbot {
            TaskKind::Chatbot
        } else {
            TaskKind::Agent
        }
    }

    fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

/// File settings first, then command-line overrides.
fn resolve_config(cli: &Cli) -> Result<SdkConfig> {
    let mut config = SdkConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(identity) = &cli.identity {
        config = config.with_identity(identity.as_str());
    }
    if let Some(server) = &cli.server {
        config = config.with_gateway_url(server.as_str());
    }
    config.validate()?;
    Ok(config)
}

/// Acknowledges each task, then completes it with its own params.
fn echo_handler() -> impl TaskHandler {
    handler_fn(|context, emit| async move {
        info!(query_id = %context.query_id, "echoing task");
        emit.query_created(json!({ "data": "received" })).await?;
        emit.query_completed(json!({ "data": context.params.clone() }))
            .await?;
        Ok::<_, anyhow::Error>(())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    tasklink_log::init_for(
        &["tasklink_agent", "tasklink_sdk", "tasklink_grpc"],
        cli.log_level(),
    );

    let config = resolve_config(&cli)?;
    let kind = cli.kind();
    let manager = match kind {
        TaskKind::Agent => init_agent(&config, echo_handler())?,
        TaskKind::Chatbot => init_chatbot(&config, echo_handler())?,
    };
    info!(
        identity = %config.identity,
        server = %config.gateway.url,
        %kind,
        "worker started, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    manager.cleanup().await;
    Ok(())
}
