//! Headless garden bot.
//!
//! Loads `bot_config.json`, joins a room and keeps the connection alive
//! until interrupted. Set `RUST_LOG` to change verbosity.

use anyhow::Context;
use clap::Parser;
use garden_client::audit::{AuditLog, DEFAULT_AUDIT_FILE};
use garden_client::config::{BotConfig, ConfigFile, DEFAULT_CONFIG_FILE, SessionSettings};
use garden_client::{Session, SessionStore, Supervisor, WebConnector};
use garden_core::RoomId;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "garden-bot")]
#[command(about = "Keeps a player connected to a garden room")]
struct Args {
    /// Room to join instead of the last one
    #[arg(short, long, value_name = "ROOM")]
    room_id: Option<String>,

    /// Settings file
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Frame audit file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_AUDIT_FILE)]
    audit_log: PathBuf,

    /// Do not fall back to the public rooms
    #[arg(long)]
    no_search: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BotConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let audit = AuditLog::create(&args.audit_log)
        .with_context(|| format!("creating {}", args.audit_log.display()))?;

    let mut plan = config.room_plan(args.room_id.map(RoomId::new));
    if args.no_search {
        plan.search_main_rooms = false;
    }

    let settings = SessionSettings::default();
    let store = SessionStore::new(config.player_id.clone(), config.cookies.clone());
    let stop = CancellationToken::new();

    let mut session = Session::new(WebConnector::new(&settings), store.clone(), settings)
        .with_audit(audit)
        .with_room_plan(plan)
        .with_persistence(ConfigFile::new(&args.config))
        .with_stop_token(stop.clone());

    tokio::spawn(report_status(store.clone(), stop.clone()));
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted; shutting down");
            }
            stop.cancel();
        }
    });

    tracing::info!(player_id = %config.player_id, "starting");
    let result = Supervisor::new(config.reconnection)
        .run(&mut session, &stop)
        .await;
    stop.cancel();
    match serde_json::to_string(&store.statistics()) {
        Ok(stats) => tracing::info!(%stats, "final statistics"),
        Err(e) => tracing::warn!(error = %e, "could not encode statistics"),
    }
    result.context("session ended")?;
    tracing::info!("stopped");
    Ok(())
}

/// Log identity and counters periodically.
async fn report_status(store: SessionStore, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let identity = store.identity();
        let stats = store.statistics();
        tracing::info!(
            player = identity.display_name(),
            room = identity.room_id.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            seat = ?identity.seat,
            received = stats.messages_received,
            sent = stats.messages_sent,
            heartbeats_sent = stats.heartbeats_sent,
            pongs_sent = stats.pongs_sent,
            patches_applied = stats.patches_applied,
            patch_ops_failed = stats.patch_ops_failed,
            last_update = ?stats.last_update.map(|t| t.format("%H:%M:%S").to_string()),
            "status"
        );
    }
}
