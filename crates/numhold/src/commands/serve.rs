//! `numhold serve`: run the expiration scheduler until SIGINT/SIGTERM.
//!
//! Operators act on the same database from other processes (`numhold hold`,
//! `numhold success`, ...). The guarded writes make the sweep and those
//! processes safe to interleave. SIGHUP re-reads `default_hold_minutes` from
//! the config files and environment.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::Duration;
use clap::ArgMatches;
use numhold_core::{load_settings, ExpirationScheduler, Settings, TransitionEngine};
use tokio::{signal, sync::broadcast::error::RecvError};
use tracing::{info, warn};

use super::open_engine;
use crate::output::Outcome;

/// Fold `serve` flags into `settings`.
pub fn apply_overrides(settings: &mut Settings, matches: &ArgMatches) {
    if let Some(secs) = matches.get_one::<u64>("sweep-secs") {
        settings.sweep_interval_secs = *secs;
    }
    if let Some(secs) = matches.get_one::<u64>("purge-secs") {
        settings.purge_interval_secs = *secs;
    }
    if let Some(hours) = matches.get_one::<u64>("retention-hours") {
        settings.retention_hours = *hours;
    }
    if let Some(minutes) = matches.get_one::<u64>("default-hold-minutes") {
        settings.default_hold_minutes = Some(*minutes);
    }
}

/// Re-read settings and replace the engine's default hold duration.
///
/// Holds already taken keep the duration they captured.
pub async fn reload_default_hold(
    engine: &TransitionEngine,
    config: Option<&Path>,
) -> Result<Option<Duration>> {
    let settings = load_settings(config)
        .await
        .context("Failed to reload settings")?;
    let default = settings.default_hold();
    engine.set_default_hold_duration(default)?;
    info!(
        default_hold_minutes = settings.default_hold_minutes,
        "Default hold reloaded"
    );
    Ok(default)
}

pub async fn run(settings: Settings, config: Option<&Path>) -> Result<Outcome> {
    let engine = Arc::new(open_engine(&settings).await?);
    let scheduler = Arc::new(ExpirationScheduler::new(
        Arc::clone(&engine),
        settings.scheduler_config(),
    )?);

    info!(
        database = %settings.database_path.display(),
        default_hold_minutes = settings.default_hold_minutes,
        "numhold serving"
    );

    let mut resolutions = scheduler.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match resolutions.recv().await {
                Ok(resolution) => info!(
                    number = %resolution.number,
                    owner = %resolution.owner_id,
                    elapsed_ms = resolution.elapsed_hold_time.num_milliseconds(),
                    "Hold expired"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Resolution reporter fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let handle = Arc::clone(&scheduler).spawn();
    wait_for_shutdown(&engine, config).await?;

    info!("Shutdown signal received");
    handle.shutdown().await;
    drop(scheduler);
    let _ = reporter.await;
    Ok(Outcome::Stopped)
}

#[cfg(unix)]
async fn wait_for_shutdown(engine: &TransitionEngine, config: Option<&Path>) -> Result<()> {
    use signal::unix::SignalKind;

    let mut sigterm = signal::unix::signal(SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    let mut sighup = signal::unix::signal(SignalKind::hangup())
        .context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                return Ok(());
            }
            _ = sigterm.recv() => return Ok(()),
            _ = sighup.recv() => {
                if let Err(err) = reload_default_hold(engine, config).await {
                    warn!(
                        error = %format!("{err:#}"),
                        "Reload failed, keeping current default hold"
                    );
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_engine: &TransitionEngine, _config: Option<&Path>) -> Result<()> {
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}

#[cfg(test)]
mod tests {
    use numhold_core::{HoldConfig, MemoryRecordStore};
    use tempfile::TempDir;

    use super::*;

    fn engine() -> TransitionEngine {
        TransitionEngine::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(HoldConfig::indefinite()),
        )
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_default() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("numhold.toml");
        std::fs::write(&path, "default_hold_minutes = 45\n")?;
        let engine = engine();

        let default = reload_default_hold(&engine, Some(&path)).await?;
        assert_eq!(default, Some(Duration::minutes(45)));
        assert_eq!(engine.hold_config().get(), Some(Duration::minutes(45)));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_default() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("numhold.toml");
        std::fs::write(&path, "sweep_interval_secs = 0\n")?;
        let engine = engine();
        engine.set_default_hold_duration(Some(Duration::minutes(10)))?;

        assert!(reload_default_hold(&engine, Some(&path)).await.is_err());
        assert_eq!(engine.hold_config().get(), Some(Duration::minutes(10)));
        Ok(())
    }
}
