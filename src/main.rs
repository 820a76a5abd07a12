use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coding_agents::agent::code::default_branch_name;
use coding_agents::agent::types::CodeRequest;
use coding_agents::config::AppConfig;
use coding_agents::platform::repo::normalize_repo;
use coding_agents::server::{create_router, AppState};
use coding_agents::services::Services;
use coding_agents::shutdown::{graceful_shutdown, wait_for_shutdown};

#[derive(Parser)]
#[command(
    name = "coding-agents",
    about = "Turns GitHub issues into reviewed pull requests"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (webhooks and API)
    Serve,
    /// Run the full code/review loop for one issue
    ProcessIssue {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        issue: u64,
        #[arg(long, default_value_t = 1)]
        iteration: u32,
    },
    /// Run the code agent once
    CodeAgent {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        issue: u64,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        pr: Option<u64>,
        #[arg(long, default_value_t = 1)]
        iteration: u32,
    },
    /// Review a pull request once and publish the review
    Review {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        pr: u64,
        /// Review immediately instead of waiting for pending CI checks
        #[arg(long)]
        no_wait_ci: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve => serve(config).await.map(|()| true),
        Command::ProcessIssue {
            repo,
            issue,
            iteration,
        } => {
            let repo = normalize_repo(&repo)?;
            let services = Services::from_config(&config)?;
            let outcome = services
                .orchestrator()
                .process(&repo, issue, iteration.max(1))
                .await;
            print_json(&outcome)?;
            Ok(outcome.success)
        }
        Command::CodeAgent {
            repo,
            issue,
            branch,
            pr,
            iteration,
        } => {
            let repo = normalize_repo(&repo)?;
            let services = Services::from_config(&config)?;
            let iteration = iteration.max(1);
            let request = CodeRequest {
                repo,
                issue_number: issue,
                branch: branch.or_else(|| Some(default_branch_name(issue, iteration))),
                pr_number: pr,
                previous_feedback: None,
                iteration,
            };
            let result = services.code_agent.execute(&request).await?;
            print_json(&result)?;
            Ok(result.success)
        }
        Command::Review {
            repo,
            pr,
            no_wait_ci,
        } => {
            let repo = normalize_repo(&repo)?;
            let services = Services::from_config(&config)?;
            let review = services.reviewer.execute(&repo, pr, !no_wait_ci).await?;
            print_json(&review)?;
            services
                .reviewer
                .publish_review(&repo, pr, &review)
                .await
                .context("failed to publish review")?;
            Ok(true)
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting coding-agents server"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    // Start the task queue processor
    let queue_state = Arc::clone(&state);
    tokio::spawn(async move {
        coding_agents::queue::run_queue_processor(queue_state).await;
    });

    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state).await;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
