#![forbid(unsafe_code)]

//! `issue-relay` server and operator CLI.
//!
//! `serve` runs the webhook HTTP surface plus the periodic batch
//! scheduler; the remaining subcommands are one-shot operator actions
//! against the same database.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use issue_relay::api::routes::create_router;
use issue_relay::batch::scheduler::spawn_scheduler;
use issue_relay::clock::SystemClock;
use issue_relay::config::GlobalConfig;
use issue_relay::helpscout::api::{ConversationApi, HelpScoutClient};
use issue_relay::helpscout::token::TokenManager;
use issue_relay::models::queue::QueueKind;
use issue_relay::persistence::db;
use issue_relay::persistence::token_repo::TokenRepo;
use issue_relay::state::AppState;
use issue_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum QueueType {
    All,
    Signup,
    Resolved,
}

#[derive(Debug, Parser)]
#[command(name = "issue-relay", about = "Jira issue sync and HelpScout notification relay", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server and the periodic batch scheduler.
    Serve,

    /// Process notification queues once.
    ProcessQueue {
        /// Items to process per queue.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Which queue to process.
        #[arg(long, value_enum, default_value_t = QueueType::All)]
        queue_type: QueueType,

        /// Preview ready-batch sizes without processing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show queue statistics.
    QueueStats,

    /// Retry dead-lettered items.
    RetryFailed {
        /// Index of a specific failed item to retry.
        index: Option<i64>,

        /// Retry every failed item.
        #[arg(long)]
        all: bool,
    },

    /// Clear all queues, including the failed queue.
    ClearQueues {
        /// Confirm clearing without prompting.
        #[arg(long)]
        yes: bool,
    },

    /// Probe Help Scout API connectivity.
    TestConnection,
}

impl Command {
    /// Whether the command talks to Help Scout and therefore needs
    /// credentials loaded.
    fn needs_credentials(&self) -> bool {
        match self {
            Self::Serve | Self::TestConnection => true,
            Self::ProcessQueue { dry_run, .. } => !dry_run,
            Self::QueueStats | Self::RetryFailed { .. } | Self::ClearQueues { .. } => false,
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if args.command.needs_credentials() {
        config.load_credentials().await?;
    }
    let config = Arc::new(config);

    let db = Arc::new(db::connect(&config.database_path).await?);

    let tokens = Arc::new(TokenManager::new(
        config.helpscout.clone(),
        TokenRepo::new(Arc::clone(&db)),
        Arc::new(SystemClock),
    )?);
    let api: Arc<dyn ConversationApi> =
        Arc::new(HelpScoutClient::new(config.helpscout.api_url.clone(), tokens)?);
    let state = AppState::build(
        Arc::clone(&config),
        db,
        api,
        Arc::new(SystemClock),
    )?;

    match args.command {
        Command::Serve => serve(&state).await,
        Command::ProcessQueue {
            batch_size,
            queue_type,
            dry_run,
        } => {
            process_queue(
                &state,
                batch_size.unwrap_or(state.config.queue.batch_size),
                queue_type,
                dry_run,
            )
            .await
        }
        Command::QueueStats => queue_stats(&state).await,
        Command::RetryFailed { index, all } => retry_failed(&state, index, all).await,
        Command::ClearQueues { yes } => clear_queues(&state, yes).await,
        Command::TestConnection => {
            state.api.test_connection().await?;
            println!("HelpScout API connection OK");
            Ok(())
        }
    }
}

async fn serve(state: &Arc<AppState>) -> Result<()> {
    info!("issue-relay server bootstrap");

    let cancel = CancellationToken::new();
    let scheduler = spawn_scheduler(
        Arc::clone(&state.processor),
        state.config.queue.batch_size,
        std::time::Duration::from_secs(state.config.queue.interval_seconds),
        cancel.clone(),
    );
    info!(
        interval_seconds = state.config.queue.interval_seconds,
        "batch scheduler started"
    );

    let router = create_router(Arc::clone(state));
    let addr = format!("0.0.0.0:{}", state.config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::Config(format!("cannot bind {addr}: {err}")))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Config(format!("http server failed: {err}")))?;

    info!("shutdown signal received");
    cancel.cancel();
    let _ = scheduler.await;
    info!("issue-relay shut down");
    Ok(())
}

async fn process_queue(
    state: &Arc<AppState>,
    batch_size: usize,
    queue_type: QueueType,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("DRY RUN MODE - no items will be processed");
        let kinds = match queue_type {
            QueueType::All => vec![QueueKind::Signup, QueueKind::Resolved],
            QueueType::Signup => vec![QueueKind::Signup],
            QueueType::Resolved => vec![QueueKind::Resolved],
        };
        for kind in kinds {
            let ready = state.queue.get_ready_batch(kind, batch_size).await?;
            println!("{kind} queue: {} item(s) ready", ready.len());
        }
        return Ok(());
    }

    match queue_type {
        QueueType::All => {
            let outcome = state.processor.process_queues(batch_size).await?;
            println!(
                "Processed {} signup items ({} success, {} failed) and {} resolved items ({} success, {} failed)",
                outcome.signup.processed,
                outcome.signup.success,
                outcome.signup.failed,
                outcome.resolved.processed,
                outcome.resolved.success,
                outcome.resolved.failed,
            );
        }
        QueueType::Signup => {
            let stats = state
                .processor
                .process_queue(QueueKind::Signup, batch_size)
                .await?;
            println!(
                "Processed {} signup items ({} success, {} failed)",
                stats.processed, stats.success, stats.failed,
            );
        }
        QueueType::Resolved => {
            let stats = state
                .processor
                .process_queue(QueueKind::Resolved, batch_size)
                .await?;
            println!(
                "Processed {} resolved items ({} success, {} failed)",
                stats.processed, stats.success, stats.failed,
            );
        }
    }
    Ok(())
}

async fn queue_stats(state: &Arc<AppState>) -> Result<()> {
    let stats = state.queue.get_stats().await?;
    println!("Notification Queue Statistics");
    println!("=============================");
    println!("Signup Queue:   {} items pending", stats.signup_pending);
    println!("Resolved Queue: {} items pending", stats.resolved_pending);
    println!("Failed Queue:   {} items", stats.failed);
    println!("Total Pending:  {} items", stats.total_pending);
    Ok(())
}

async fn retry_failed(state: &Arc<AppState>, index: Option<i64>, all: bool) -> Result<()> {
    if all {
        let failed = state.queue.list_failed().await?;
        if failed.is_empty() {
            println!("No failed items to retry");
            return Ok(());
        }
        // Indexes shift as items are removed; always retry the head.
        let mut count = 0usize;
        for _ in 0..failed.len() {
            if state.queue.retry_failed_item(0).await? {
                count += 1;
            }
        }
        println!("Retrying {count} failed items");
    } else if let Some(index) = index {
        if state.queue.retry_failed_item(index).await? {
            println!("Retrying failed item at index {index}");
        } else {
            return Err(AppError::NotFound(format!(
                "failed item at index {index} not found"
            )));
        }
    } else {
        return Err(AppError::Validation(
            "specify --all or an item index".into(),
        ));
    }
    Ok(())
}

async fn clear_queues(state: &Arc<AppState>, yes: bool) -> Result<()> {
    if !yes {
        return Err(AppError::Validation(
            "pass --yes to confirm clearing all queues".into(),
        ));
    }
    state.queue.clear_all().await?;
    println!("All queues cleared");
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
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
