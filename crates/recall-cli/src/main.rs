mod config;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use config::RecallConfig;
use recall_core::Message;
use recall_heartbeat::{HeartbeatHandler, HeartbeatOutcome, HeartbeatService};
use recall_session::{migrate_legacy_sessions, OpContext, SessionStore, SqliteSessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recall", about = "Recall: persistent session memory for agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import legacy JSON session files into the database
    Migrate {
        /// Directory holding the legacy files (overrides config)
        #[arg(long)]
        legacy_dir: Option<PathBuf>,
    },
    /// Print a session's message history
    History {
        /// Session key
        key: String,
    },
    /// Print or replace a session's summary
    Summary {
        /// Session key
        key: String,
        /// New summary text
        #[arg(long)]
        set: Option<String>,
    },
    /// Drop all but the most recent messages of a session
    Truncate {
        /// Session key
        key: String,
        /// Number of messages to keep
        #[arg(long)]
        keep: usize,
    },
    /// Delete a session and its messages
    Delete {
        /// Session key
        key: String,
    },
    /// List stored sessions
    Sessions,
    /// Run the heartbeat until interrupted
    Heartbeat,
}

/// Heartbeat handler that only records the prompt in the log stream.
struct LoggingHandler;

#[async_trait]
impl HeartbeatHandler for LoggingHandler {
    async fn deliver(&self, prompt: &str) -> HeartbeatOutcome {
        info!(bytes = prompt.len(), "heartbeat prompt ready");
        HeartbeatOutcome::Completed(format!("prompt of {} bytes logged", prompt.len()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RecallConfig::load(&cli.config).await?;

    let ctx = interruptible_context();
    let store = SqliteSessionStore::open_with(config.db_path(), config.database.clone()).await?;

    let result = run_store_command(&ctx, &store, &config, cli.command).await;
    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close session store");
    }
    result
}

/// A context cancelled by Ctrl-C.
fn interruptible_context() -> OpContext {
    let ctx = OpContext::background();
    let token = ctx.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    ctx
}

async fn run_store_command(
    ctx: &OpContext,
    store: &SqliteSessionStore,
    config: &RecallConfig,
    command: Commands,
) -> anyhow::Result<()> {
    if config.migration.enabled && !matches!(command, Commands::Migrate { .. }) {
        migrate_legacy_sessions(ctx, &config.migration.legacy_dir, store).await?;
    }

    match command {
        Commands::Migrate { legacy_dir } => {
            let dir = legacy_dir.unwrap_or_else(|| config.migration.legacy_dir.clone());
            let report = migrate_legacy_sessions(ctx, &dir, store).await?;
            println!(
                "Imported {} session(s) from {} ({} skipped, {} failed)",
                report.imported,
                dir.display(),
                report.skipped,
                report.failed
            );
        }
        Commands::History { key } => {
            let history = store.history_with_seq(ctx, &key).await?;
            if history.is_empty() {
                println!("No messages for '{key}'.");
            }
            for stored in &history {
                print_message(stored.seq, &stored.message);
            }
        }
        Commands::Summary { key, set: Some(text) } => {
            store.set_summary(ctx, &key, &text).await?;
            println!("Summary updated for '{key}'.");
        }
        Commands::Summary { key, set: None } => {
            let summary = store.get_summary(ctx, &key).await?;
            if summary.is_empty() {
                println!("No summary for '{key}'.");
            } else {
                println!("{summary}");
            }
        }
        Commands::Truncate { key, keep } => {
            store.truncate_history(ctx, &key, keep).await?;
            println!("Kept the last {keep} message(s) of '{key}'.");
        }
        Commands::Delete { key } => {
            if store.delete_session(ctx, &key).await? {
                println!("Deleted '{key}'.");
            } else {
                println!("No session '{key}'.");
            }
        }
        Commands::Sessions => {
            let sessions = store.list_sessions(ctx).await?;
            if sessions.is_empty() {
                println!("No sessions stored.");
            } else {
                println!("Sessions:");
                for session in &sessions {
                    println!(
                        "  {}  {} message(s)  updated {}",
                        session.key,
                        session.message_count,
                        session.updated_at.to_rfc3339()
                    );
                }
                println!("\nTotal: {} session(s)", sessions.len());
            }
        }
        Commands::Heartbeat => run_heartbeat(config).await?,
    }
    Ok(())
}

fn print_message(seq: u64, message: &Message) {
    println!("{seq:>4}  {}: {}", message.role, message.content);
    for call in &message.tool_calls {
        let name = call.function_name().unwrap_or("?");
        let args = call.function.as_ref().map_or("", |f| f.arguments.as_str());
        println!("        -> {} {name}({args})", call.id);
    }
    if !message.tool_call_id.is_empty() {
        println!("        <- {}", message.tool_call_id);
    }
}

async fn run_heartbeat(config: &RecallConfig) -> anyhow::Result<()> {
    let service = HeartbeatService::new(config.heartbeat.clone(), Arc::new(LoggingHandler));
    service.start()?;
    info!("Heartbeat running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    service.stop().await;
    Ok(())
}
