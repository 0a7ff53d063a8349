//! Command-line entrypoint for the feedback worker.
//!
//! `analyze` grades a standalone JSON bundle. `advance` and `retry` operate on
//! stored sessions; when a session reaches `completed` the command waits for
//! its feedback job before exiting.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use oralexam_core::lifecycle::SessionPhase;
use oralexam_worker::{
    analyze::analyze_file,
    config::Config,
    jobs::FeedbackTicket,
    state::{AppState, build_orchestrator},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "oralexam", version, about = "Oral-exam practice feedback worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the feedback pipeline on a JSON bundle and print the result.
    Analyze {
        /// File holding `{transcript, timestamps, image}`.
        #[arg(long)]
        input: PathBuf,
    },
    /// Move a stored session to another phase.
    Advance {
        #[arg(long)]
        session_id: Uuid,
        /// preparing, presenting, conversing, completed or terminated.
        #[arg(long)]
        phase: SessionPhase,
    },
    /// Re-run feedback for a completed session whose last run failed.
    Retry {
        #[arg(long)]
        session_id: Uuid,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn wait_for(ticket: FeedbackTicket) -> Result<()> {
    let session_id = ticket.session_id();
    match ticket.wait().await {
        Some(state) => {
            info!(%session_id, %state, "Feedback job finished");
            Ok(())
        }
        None => bail!("Feedback queue shut down before session {session_id} was processed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded.");

    // --- 3. Run Command ---
    match cli.command {
        Command::Analyze { input } => {
            let orchestrator = build_orchestrator(&config)?;
            let record = analyze_file(orchestrator, &input, config.feedback_timeout).await?;
            print_json(&record)?;
        }
        Command::Advance { session_id, phase } => {
            let (state, dispatcher) = AppState::from_config(config).await?;
            let outcome = state.sessions.advance(session_id, phase).await?;
            if let Some(ticket) = outcome.feedback {
                wait_for(ticket).await?;
            }
            print_json(&state.sessions.get_session(session_id).await?)?;
            drop(state);
            dispatcher.await?;
        }
        Command::Retry { session_id } => {
            let (state, dispatcher) = AppState::from_config(config).await?;
            let ticket = state.sessions.retry(session_id).await?;
            wait_for(ticket).await?;
            print_json(&state.sessions.get_session(session_id).await?)?;
            drop(state);
            dispatcher.await?;
        }
    }

    Ok(())
}
