#![forbid(unsafe_code)]

//! `agent-conduit`: drive an app server from the command line.
//!
//! Loads configuration, launches the app server, performs the handshake and
//! runs one turn, one review or a model listing. The aggregated result is
//! printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::aggregator::{run_review, run_turn, RunOptions};
use agent_conduit::client::AppServerClient;
use agent_conduit::config::ClientConfig;
use agent_conduit::models::command::ModelListParams;
use agent_conduit::models::review::{ReviewStartParams, ReviewTarget};
use agent_conduit::models::thread::{ThreadOverrides, ThreadStartParams};
use agent_conduit::models::turn::TurnStartParams;
use agent_conduit::{ClientError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Run agent turns and reviews against an app server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one turn and print the aggregated result.
    Turn(TurnArgs),
    /// Run one review and print the review text.
    Review(ReviewArgs),
    /// List the models the server offers.
    Models,
}

#[derive(Debug, Args)]
struct ThreadArgs {
    /// Existing thread to use; a new thread is started when omitted.
    #[arg(long)]
    thread: Option<String>,

    /// Working directory for a new thread.
    #[arg(long)]
    cwd: Option<String>,

    /// Model for a new thread.
    #[arg(long)]
    model: Option<String>,

    /// Give up waiting for completion after this many seconds.
    #[arg(long)]
    wait_seconds: Option<u64>,
}

#[derive(Debug, Args)]
struct TurnArgs {
    #[command(flatten)]
    thread: ThreadArgs,

    /// Prompt text.
    prompt: String,
}

#[derive(Debug, Args)]
struct ReviewArgs {
    #[command(flatten)]
    thread: ThreadArgs,

    /// Review changes against this base branch.
    #[arg(long, conflicts_with_all = ["commit", "instructions"])]
    base_branch: Option<String>,

    /// Review a single commit.
    #[arg(long, conflicts_with = "instructions")]
    commit: Option<String>,

    /// Free-form review instructions.
    #[arg(long)]
    instructions: Option<String>,
}

impl ReviewArgs {
    fn target(&self) -> ReviewTarget {
        if let Some(branch) = &self.base_branch {
            ReviewTarget::BaseBranch {
                branch: branch.clone(),
            }
        } else if let Some(sha) = &self.commit {
            ReviewTarget::Commit {
                sha: sha.clone(),
                title: None,
            }
        } else if let Some(instructions) = &self.instructions {
            ReviewTarget::Custom {
                instructions: instructions.clone(),
            }
        } else {
            ReviewTarget::UncommittedChanges
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-conduit starting");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| ClientError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => {
            let mut config = ClientConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config
        }
    };

    // ── Launch and handshake ────────────────────────────
    let client = AppServerClient::launch(&config).await?;
    info!("app server ready");

    let outcome = tokio::select! {
        result = execute(&client, args.command) => result,
        () = shutdown_signal() => {
            warn!("shutdown signal received, abandoning command");
            Err(ClientError::TransportClosed("interrupted by signal".into()))
        }
    };

    // ── Shut down ───────────────────────────────────────
    if let Err(err) = client.shutdown().await {
        error!(%err, "shutdown failed");
    }
    outcome
}

async fn execute(client: &AppServerClient, command: Command) -> Result<()> {
    match command {
        Command::Turn(turn) => {
            let thread_id = resolve_thread(client, &turn.thread).await?;
            let params = TurnStartParams::text(thread_id, turn.prompt);
            let result = run_turn(client, &params, &run_options(&turn.thread)).await?;
            print_json(&result)
        }
        Command::Review(review) => {
            let thread_id = resolve_thread(client, &review.thread).await?;
            let params = ReviewStartParams {
                thread_id,
                target: review.target(),
                delivery: None,
            };
            let result = run_review(client, &params, &run_options(&review.thread)).await?;
            print_json(&result)
        }
        Command::Models => {
            let models = client.model_list(&ModelListParams::default()).await?;
            print_json(&models)
        }
    }
}

async fn resolve_thread(client: &AppServerClient, args: &ThreadArgs) -> Result<String> {
    if let Some(thread_id) = &args.thread {
        return Ok(thread_id.clone());
    }
    let params = ThreadStartParams {
        overrides: ThreadOverrides {
            model: args.model.clone(),
            cwd: args.cwd.clone(),
            ..ThreadOverrides::default()
        },
    };
    let started = client.thread_start(&params).await?;
    info!(thread_id = started.thread.id.as_str(), "thread started");
    Ok(started.thread.id)
}

fn run_options(args: &ThreadArgs) -> RunOptions {
    RunOptions {
        wait_timeout: args.wait_seconds.map(Duration::from_secs),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| ClientError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| ClientError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
