//! pitbot — watches release manifests and announces new patches.
//!
//! Subcommands:
//! - `run` (default): poll every channel on its interval until Ctrl-C
//! - `once`: poll every enabled channel once and exit
//! - `test-notify`: post a test message to the configured chat room

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use pitbot_core::config::load_dotenv;
use pitbot_core::Config;
use pitbot_monitor::{
    ArchiveWriter, HttpManifestFetcher, JsonStateStore, Pipeline, PollOutcome, Scheduler,
};
use pitbot_notify::{Dispatcher, HipChatNotifier, JiraTracker, Notifier, Room};

// ── CLI ─────────────────────────────────────────────────────────────

/// Release manifest monitor.
#[derive(Parser, Debug)]
#[command(name = "pitbot", version, about)]
struct Cli {
    /// Watch list data file (overrides PITBOT_DATA_FILE from .env).
    #[arg(long, env = "PITBOT_DATA_FILE")]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Poll every channel on its interval until interrupted.
    Run,
    /// Poll every enabled channel once, then exit.
    Once,
    /// Send a test message to the chat room.
    TestNotify,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.data_file {
        config.monitor.data_file = path;
    }
    config.log_summary();

    let store = Arc::new(
        JsonStateStore::open(&config.monitor.data_file).with_context(|| {
            format!(
                "failed to load watch list {}",
                config.monitor.data_file.display()
            )
        })?,
    );
    let list = store.snapshot().await;

    let chat = list
        .chat
        .as_ref()
        .context("watch list has no hipchat_configuration")?;
    let notify_timeout = config.chat.notify_timeout();
    let notifier = Arc::new(HipChatNotifier::from_config(
        &config.chat.api_url,
        &chat.api_key,
        notify_timeout,
    )?);
    let room = Room {
        room_id: config.chat.room_id.clone(),
        sender: config.chat.sender.clone(),
    };

    if let Some(Command::TestNotify) = cli.command {
        notifier
            .test(&room.room_id, &room.sender)
            .await
            .context("test message was not delivered")?;
        info!(room_id = %room.room_id, "Test message delivered");
        return Ok(());
    }

    let mut dispatcher = Dispatcher::new(notifier, room, config.archive.base_url.clone())
        .with_delivery_timeout(notify_timeout * 2);
    dispatcher
        .validate()
        .context("PITBOT_ARCHIVE_BASE_URL is not a usable base url")?;
    let template = config
        .chat
        .announcement_template()
        .context("failed to read PITBOT_ANNOUNCEMENT_TEMPLATE")?;
    if let Some(template) = template {
        dispatcher = dispatcher.with_template(template)?;
        info!("Using custom announcement template");
    }
    match &list.tracker {
        Some(credentials) => {
            dispatcher = dispatcher.with_tracker(Arc::new(JiraTracker::from_config(
                credentials,
                notify_timeout,
            )?));
            info!(host = %credentials.host, "Jira version tracking enabled");
        }
        None => info!("No jira_configuration, tracker versions disabled"),
    }

    let fetcher = HttpManifestFetcher::new(config.monitor.fetch_timeout())
        .context("failed to build HTTP client")?;
    let pipeline = Arc::new(
        Pipeline::new(
            Arc::new(fetcher),
            store.clone(),
            ArchiveWriter::new(&config.archive.root),
            Arc::new(dispatcher),
        )
        .fetch_timeout(config.monitor.fetch_timeout())
        .persist_attempts(config.monitor.persist_retries),
    );

    let titles = list.titles()?;
    info!(
        titles = titles.len(),
        channels = list.channel_count(),
        "Watch list loaded"
    );
    let scheduler = Scheduler::new(titles, pipeline);

    match cli.command.unwrap_or(Command::Run) {
        Command::Once => {
            let results = scheduler.poll_enabled_once().await;
            let released = results
                .iter()
                .filter(|r| matches!(r, Ok(PollOutcome::Released(_))))
                .count();
            let failed = results.iter().filter(|r| r.is_err()).count();
            info!(
                polled = results.len(),
                released, failed, "Single pass complete"
            );
        }
        Command::Run => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handles = scheduler.spawn(shutdown_rx);

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            futures::future::join_all(handles).await;
            info!("pitbot stopped");
        }
        Command::TestNotify => {}
    }

    Ok(())
}
