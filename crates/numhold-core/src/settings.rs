//! Layered runtime settings.
//!
//! # Load order (later wins)
//!
//! 1. Built-in defaults
//! 2. Global config: `<config_dir>/numhold/config.toml`
//! 3. Project config: `.numhold/config.toml` in the working directory
//! 4. An explicit file passed by the caller (`--config`)
//! 5. `NUMHOLD_*` environment variables
//!
//! Command-line flags are applied by the binary after [`load_settings`].

use std::{
    path::{Path, PathBuf},
    time::Duration as StdDuration,
};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{scheduler::SchedulerConfig, Error, Result};

const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;
const MAX_HOLD_MINUTES: u64 = 60 * 24 * 365 * 10;

/// Resolved settings for a numhold process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub database_path: PathBuf,
    pub sweep_interval_secs: u64,
    pub purge_interval_secs: u64,
    pub retention_hours: u64,
    pub store_timeout_ms: u64,
    pub max_connections: u32,
    /// Seed for the default hold duration. Unset means indefinite.
    pub default_hold_minutes: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            sweep_interval_secs: 60,
            purge_interval_secs: 3600,
            retention_hours: 24,
            store_timeout_ms: 5000,
            max_connections: 5,
            default_hold_minutes: None,
        }
    }
}

/// One config file. Every key is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsLayer {
    database_path: Option<PathBuf>,
    sweep_interval_secs: Option<u64>,
    purge_interval_secs: Option<u64>,
    retention_hours: Option<u64>,
    store_timeout_ms: Option<u64>,
    max_connections: Option<u32>,
    default_hold_minutes: Option<u64>,
}

impl Settings {
    fn merge(&mut self, layer: SettingsLayer) {
        if let Some(path) = layer.database_path {
            self.database_path = path;
        }
        if let Some(secs) = layer.sweep_interval_secs {
            self.sweep_interval_secs = secs;
        }
        if let Some(secs) = layer.purge_interval_secs {
            self.purge_interval_secs = secs;
        }
        if let Some(hours) = layer.retention_hours {
            self.retention_hours = hours;
        }
        if let Some(ms) = layer.store_timeout_ms {
            self.store_timeout_ms = ms;
        }
        if let Some(n) = layer.max_connections {
            self.max_connections = n;
        }
        if layer.default_hold_minutes.is_some() {
            self.default_hold_minutes = layer.default_hold_minutes;
        }
    }

    /// Apply `NUMHOLD_*` overrides read through `lookup`.
    ///
    /// An empty `NUMHOLD_DEFAULT_HOLD_MINUTES` clears the default hold.
    pub fn apply_env_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NUMHOLD_DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("NUMHOLD_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_env("NUMHOLD_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("NUMHOLD_PURGE_INTERVAL_SECS") {
            self.purge_interval_secs = parse_env("NUMHOLD_PURGE_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("NUMHOLD_RETENTION_HOURS") {
            self.retention_hours = parse_env("NUMHOLD_RETENTION_HOURS", &value)?;
        }
        if let Some(value) = lookup("NUMHOLD_STORE_TIMEOUT_MS") {
            self.store_timeout_ms = parse_env("NUMHOLD_STORE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("NUMHOLD_MAX_CONNECTIONS") {
            self.max_connections = parse_env("NUMHOLD_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("NUMHOLD_DEFAULT_HOLD_MINUTES") {
            self.default_hold_minutes = if value.trim().is_empty() {
                None
            } else {
                Some(parse_env("NUMHOLD_DEFAULT_HOLD_MINUTES", &value)?)
            };
        }
        Ok(())
    }

    /// Reject values no process can run with.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("database_path cannot be empty".into()));
        }
        for (name, value) in [
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("purge_interval_secs", self.purge_interval_secs),
            ("retention_hours", self.retention_hours),
            ("store_timeout_ms", self.store_timeout_ms),
            ("max_connections", u64::from(self.max_connections)),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.retention_hours > MAX_RETENTION_HOURS {
            return Err(Error::InvalidConfig(format!(
                "retention_hours must be at most {MAX_RETENTION_HOURS}"
            )));
        }
        if self
            .default_hold_minutes
            .is_some_and(|minutes| minutes > MAX_HOLD_MINUTES)
        {
            return Err(Error::InvalidConfig(format!(
                "default_hold_minutes must be at most {MAX_HOLD_MINUTES}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: StdDuration::from_secs(self.sweep_interval_secs),
            purge_interval: StdDuration::from_secs(self.purge_interval_secs),
            retention: Duration::hours(clamp_i64(self.retention_hours, MAX_RETENTION_HOURS)),
        }
    }

    #[must_use]
    pub const fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }

    /// Default hold duration to seed `HoldConfig` with.
    #[must_use]
    pub fn default_hold(&self) -> Option<Duration> {
        self.default_hold_minutes
            .map(|minutes| Duration::minutes(clamp_i64(minutes, MAX_HOLD_MINUTES)))
    }
}

fn clamp_i64(value: u64, max: u64) -> i64 {
    i64::try_from(value.min(max)).unwrap_or(i64::MAX)
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("Invalid {key} value '{value}': {e}")))
}

/// Load settings from every layer, then validate.
///
/// Missing global and project files are skipped. A missing `explicit` file
/// is an error.
pub async fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(global) = global_config_path() {
        if global.exists() {
            settings.merge(load_layer(&global).await?);
        }
    }

    if let Ok(project) = project_config_path() {
        if project.exists() {
            settings.merge(load_layer(&project).await?);
        }
    }

    if let Some(path) = explicit {
        settings.merge(load_layer(path).await?);
    }

    settings.apply_env_vars(|key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

/// Path of the global config file, if the platform has a config dir.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "numhold")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".numhold").join("config.toml"))
        .map_err(|e| Error::InvalidConfig(format!("Failed to get current directory: {e}")))
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "numhold").map_or_else(
        || PathBuf::from(".numhold").join("numhold.db"),
        |dirs| dirs.data_dir().join("numhold.db"),
    )
}

async fn load_layer(path: &Path) -> Result<SettingsLayer> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::InvalidConfig(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scheduler_config(), SchedulerConfig::default());
        assert_eq!(settings.store_timeout(), StdDuration::from_secs(5));
        assert_eq!(settings.default_hold(), None);
    }

    #[test]
    fn test_later_layer_overrides_earlier() {
        let mut settings = Settings::default();
        settings.merge(SettingsLayer {
            sweep_interval_secs: Some(30),
            retention_hours: Some(48),
            ..SettingsLayer::default()
        });
        settings.merge(SettingsLayer {
            sweep_interval_secs: Some(10),
            ..SettingsLayer::default()
        });

        assert_eq!(settings.sweep_interval_secs, 10);
        assert_eq!(settings.retention_hours, 48);
        assert_eq!(settings.purge_interval_secs, 3600);
    }

    #[test]
    fn test_env_overrides_file_values() -> Result<()> {
        let mut settings = Settings {
            default_hold_minutes: Some(30),
            ..Settings::default()
        };
        settings.apply_env_vars(env(&[
            ("NUMHOLD_STORE_TIMEOUT_MS", "250"),
            ("NUMHOLD_DATABASE_PATH", "/tmp/numbers.db"),
            ("NUMHOLD_DEFAULT_HOLD_MINUTES", ""),
        ]))?;

        assert_eq!(settings.store_timeout(), StdDuration::from_millis(250));
        assert_eq!(settings.database_path, PathBuf::from("/tmp/numbers.db"));
        assert_eq!(settings.default_hold_minutes, None);
        Ok(())
    }

    #[test]
    fn test_unparseable_env_value_is_invalid_config() {
        let mut settings = Settings::default();
        let result = settings.apply_env_vars(env(&[("NUMHOLD_MAX_CONNECTIONS", "many")]));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let zero_sweep = Settings {
            sweep_interval_secs: 0,
            ..Settings::default()
        };
        let zero_timeout = Settings {
            store_timeout_ms: 0,
            ..Settings::default()
        };
        let zero_pool = Settings {
            max_connections: 0,
            ..Settings::default()
        };
        for settings in [zero_sweep, zero_timeout, zero_pool] {
            assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_default_hold_converts_minutes() {
        let settings = Settings {
            default_hold_minutes: Some(90),
            ..Settings::default()
        };
        assert_eq!(settings.default_hold(), Some(Duration::minutes(90)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result: std::result::Result<SettingsLayer, _> =
            toml::from_str("sweep_interval_secs = 5\nhold_forever = true\n");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_explicit_file_is_loaded() -> Result<()> {
        let dir = tempfile::tempdir()
            .map_err(|e| Error::InvalidConfig(format!("tempdir: {e}")))?;
        let path = dir.path().join("numhold.toml");
        std::fs::write(
            &path,
            "purge_interval_secs = 120\ndefault_hold_minutes = 15\n",
        )
        .map_err(|e| Error::InvalidConfig(format!("write: {e}")))?;

        let layer = load_layer(&path).await?;
        let mut settings = Settings::default();
        settings.merge(layer);

        assert_eq!(settings.purge_interval_secs, 120);
        assert_eq!(settings.default_hold(), Some(Duration::minutes(15)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let result = load_layer(Path::new("/nonexistent/numhold/config.toml")).await;
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
