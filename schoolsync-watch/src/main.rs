//! schoolsync-watch entry point.

use schoolsync_realtime::{AppState, RealtimeContext, RealtimeManager, RealtimeStatus};
use schoolsync_watch::cache::LoggingCache;
use schoolsync_watch::config::WatchConfig;
use schoolsync_watch::console::ConsoleCommand;
use schoolsync_watch::error::WatchError;
use schoolsync_watch::telemetry;
use schoolsync_watch::transport::PhoenixChangeFeed;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), WatchError> {
    let config = WatchConfig::load()?;
    telemetry::init_tracing(config.log_format)?;

    let feed = Arc::new(PhoenixChangeFeed::new(config.phoenix_settings()));
    let cache = Arc::new(LoggingCache::new());
    let ctx = RealtimeContext::new(feed, cache.clone(), config.realtime_settings())?;

    let (identity_tx, identity_rx) = watch::channel(Some(config.session.clone()));
    let (lifecycle_tx, lifecycle_rx) = watch::channel(AppState::Foreground);
    let manager = RealtimeManager::spawn(ctx, identity_rx, lifecycle_rx);
    let mut status = manager.status();

    tracing::info!(
        role = %config.session.role(),
        user_id = %config.session.user_id(),
        "schoolsync-watch started; commands: bg, fg, login, logout, status, quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                log_status(&status.borrow_and_update());
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Background) => {
                        lifecycle_tx.send_replace(AppState::Background);
                    }
                    Ok(ConsoleCommand::Foreground) => {
                        lifecycle_tx.send_replace(AppState::Foreground);
                    }
                    Ok(ConsoleCommand::Login) => {
                        identity_tx.send_replace(Some(config.session.clone()));
                    }
                    Ok(ConsoleCommand::Logout) => {
                        identity_tx.send_replace(None);
                    }
                    Ok(ConsoleCommand::Status) => log_status(&status.borrow()),
                    Ok(ConsoleCommand::Quit) => break,
                    Err(e) => tracing::warn!(error = %e, "Ignoring input"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "Stopped reading stdin");
                    stdin_open = false;
                }
            },
        }
    }

    manager.shutdown().await?;
    tracing::info!(invalidations = cache.invalidations(), "schoolsync-watch stopped");
    Ok(())
}

fn log_status(status: &RealtimeStatus) {
    tracing::info!(
        connected = status.is_connected,
        last_error = ?status.last_error,
        last_event_at = ?status.last_event_at,
        "Realtime status"
    );
}
