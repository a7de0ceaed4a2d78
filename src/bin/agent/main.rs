mod face;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use web_navigator::events::{EventSink, FanoutSink, JsonlSink, NoopSink};
use web_navigator::{BrowserSession, ChatClient, HistoryEntry, Navigator, Settings, TaskOutcome};

#[derive(Parser)]
#[command(name = "agent", version, about = "Drives a browser with a language model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve POST /execute, GET /events and GET /health
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Run one task and print the result as JSON
    Run { task: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_tracing(&settings.log_dir)?;

    match cli.command {
        Command::Serve { host, port } => face::serve(settings, &host, port).await,
        Command::Run { task } => {
            let (outcome, history) = tokio::task::spawn_blocking(move || {
                execute_task(&settings, &task, Arc::new(NoopSink))
            })
            .await
            .context("navigation task panicked")??;

            match outcome {
                TaskOutcome::Succeeded { result } => {
                    let body = json!({
                        "status": "success",
                        "result": result,
                        "history": history,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    Ok(())
                }
                TaskOutcome::Failed(failure) => {
                    error!("[Agent] {}", failure);
                    Err(failure.into())
                }
            }
        }
    }
}

/// Launches a fresh browser and chat client, runs one task on them and
/// tears both down. Blocking; call from the blocking pool.
pub fn execute_task(
    settings: &Settings,
    task: &str,
    sink: Arc<dyn EventSink>,
) -> Result<(TaskOutcome, Vec<HistoryEntry>)> {
    info!("[Agent] Launching Chrome...");
    let session = BrowserSession::launch(&settings.browser).context("could not start the browser")?;
    let model = ChatClient::new(settings.model.clone()).context("could not build the chat client")?;

    let sink: Arc<dyn EventSink> = match &settings.debug_log {
        Some(path) => {
            let jsonl = JsonlSink::open(path)
                .with_context(|| format!("could not open debug log {}", path.display()))?;
            Arc::new(FanoutSink::new().with(sink).with(Arc::new(jsonl)))
        }
        None => sink,
    };

    let mut navigator = Navigator::new(session, model, settings.navigator.clone()).with_sink(sink);
    let outcome = navigator.run_task(task);
    Ok((outcome, navigator.into_history().into_entries()))
}

fn init_tracing(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("web_navigator")
        .filename_suffix("log")
        .max_log_files(14)
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // the writer stops flushing once the guard is dropped
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}
