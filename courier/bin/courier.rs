//! Command-line front end for the courier dispatcher
//!
//! Dispatches single messages or batches through the configured providers
//! and prints the outcome, optionally followed by the full event log.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use courier::Courier;
use courier_common::{Message, internal, logging};
use courier_dispatch::{CancellationToken, DispatchEngine};
use futures_util::future::join_all;

/// Resilient email dispatch with provider failover
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Dispatch email through a prioritised list of providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides COURIER_CONFIG and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dispatch a single message
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Message id, used for duplicate suppression (defaults to a fresh ULID)
        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long, default_value = "")]
        body: String,

        /// Print the event log after the outcome
        #[arg(long)]
        logs: bool,
    },
    /// Dispatch every message in a RON file concurrently
    Batch {
        /// RON list of messages
        file: PathBuf,

        /// Print the event log after the outcomes
        #[arg(long)]
        logs: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            internal!(level = INFO, "CTRL+C entered, cancelling in-flight dispatches");
            token.cancel();
        }
    });
}

fn print_logs(engine: &DispatchEngine) {
    println!("\n--- Logs ---\n{}", engine.logs());
}

async fn send(engine: &DispatchEngine, message: Message, logs: bool) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());

    let result = engine.dispatch_with_cancel(&message, &token).await;
    if logs {
        print_logs(engine);
    }

    let outcome = result.with_context(|| format!("Dispatch of {} failed", message.id()))?;
    println!("{outcome}");

    Ok(())
}

async fn batch(engine: &DispatchEngine, file: &Path, logs: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read messages from {}", file.display()))?;
    let messages: Vec<Message> = ron::from_str(&content)
        .with_context(|| format!("Failed to parse messages from {}", file.display()))?;

    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());

    let results = join_all(
        messages
            .iter()
            .map(|message| engine.dispatch_with_cancel(message, &token)),
    )
    .await;

    for (message, result) in messages.iter().zip(results) {
        match result {
            Ok(outcome) => println!("{}: {outcome}", message.id()),
            Err(error) => println!("{}: {error}", message.id()),
        }
    }

    if logs {
        print_logs(engine);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let courier = Courier::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", courier.to_ron()?);
            Ok(())
        }
        Commands::Send {
            to,
            id,
            subject,
            body,
            logs,
        } => {
            let engine = courier.engine()?;
            let id = id.unwrap_or_else(|| ulid::Ulid::new().to_string());
            send(&engine, Message::new(id, to, subject, body), logs).await
        }
        Commands::Batch { file, logs } => {
            let engine = courier.engine()?;
            batch(&engine, &file, logs).await
        }
    }
}
