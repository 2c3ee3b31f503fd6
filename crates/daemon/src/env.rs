// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon.
//!
//! Every recognized `DEVGODZILLA_*` option is parsed here, once, at
//! startup. An invalid value aborts startup (exit code 2 at the CLI).

use dg_core::DispatchMode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration parsing
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine state directory (set DEVGODZILLA_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("windmill enabled but {0} is missing")]
    IncompleteWindmill(&'static str),
}

/// Windmill wiring.
#[derive(Debug, Clone)]
pub struct WindmillSettings {
    pub url: String,
    pub token: String,
    pub workspace: String,
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (store, socket, logs).
    pub state_dir: PathBuf,
    /// Bound on concurrent blocking store work (QA evaluations,
    /// reconciliation sweeps).
    pub pool_size: usize,
    /// Bearer token required on protected routes (enforced by the HTTP
    /// facade; parsed here on its behalf).
    pub api_token: Option<String>,
    /// Shared secret for webhook routes.
    pub webhook_token: Option<String>,
    /// Allowed CORS origins; empty denies all browsers.
    pub cors_allow_origins: Vec<String>,
    /// External executor wiring; `None` disables external dispatch.
    pub windmill: Option<WindmillSettings>,
    /// Global engine default.
    pub default_engine_id: Option<String>,
    /// Bounded auto-fix loop budget.
    pub qa_max_auto_fix_attempts: u32,
    /// Legacy `running -> completed` shortcut.
    pub qa_direct_complete: bool,
    /// Periodic reconciliation interval.
    pub reconcile_interval: Duration,
    /// Per-engine execution wall clock.
    pub engine_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;

        let pool_size = parse_var("DEVGODZILLA_DB_POOL_SIZE", 8usize)?;
        let qa_max_auto_fix_attempts = parse_var("DEVGODZILLA_QA_MAX_AUTO_FIX_ATTEMPTS", 0u32)?;
        let reconcile_secs = parse_var("DEVGODZILLA_RECONCILE_INTERVAL_SECS", 300u64)?;
        let engine_timeout_secs = parse_var("DEVGODZILLA_ENGINE_TIMEOUT_SECS", 900u64)?;

        let windmill = if bool_var("DEVGODZILLA_WINDMILL_ENABLED") {
            Some(WindmillSettings {
                url: std::env::var("DEVGODZILLA_WINDMILL_URL")
                    .map_err(|_| ConfigError::IncompleteWindmill("DEVGODZILLA_WINDMILL_URL"))?,
                token: std::env::var("DEVGODZILLA_WINDMILL_TOKEN")
                    .map_err(|_| ConfigError::IncompleteWindmill("DEVGODZILLA_WINDMILL_TOKEN"))?,
                workspace: std::env::var("DEVGODZILLA_WINDMILL_WORKSPACE").map_err(|_| {
                    ConfigError::IncompleteWindmill("DEVGODZILLA_WINDMILL_WORKSPACE")
                })?,
            })
        } else {
            None
        };

        Ok(Self {
            state_dir,
            pool_size,
            api_token: std::env::var("DEVGODZILLA_API_TOKEN").ok(),
            webhook_token: std::env::var("DEVGODZILLA_WEBHOOK_TOKEN").ok(),
            cors_allow_origins: list_var("DEVGODZILLA_CORS_ALLOW_ORIGINS"),
            windmill,
            default_engine_id: std::env::var("DEVGODZILLA_DEFAULT_ENGINE_ID").ok(),
            qa_max_auto_fix_attempts,
            qa_direct_complete: bool_var("DEVGODZILLA_QA_DIRECT_COMPLETE"),
            reconcile_interval: Duration::from_secs(reconcile_secs),
            engine_timeout: Duration::from_secs(engine_timeout_secs),
        })
    }

    /// External dispatch when Windmill is wired, local otherwise.
    pub fn dispatch_mode(&self) -> DispatchMode {
        if self.windmill.is_some() {
            DispatchMode::External
        } else {
            DispatchMode::Local
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("daemon.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("daemon.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("daemon.log")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

/// Resolve state directory:
/// `DEVGODZILLA_STATE_DIR` > `DEVGODZILLA_DB_PATH` > `DEVGODZILLA_DB_URL`
/// (file form) > `XDG_STATE_HOME/devgodzilla` > `~/.local/state/devgodzilla`.
fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("DEVGODZILLA_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("DEVGODZILLA_DB_PATH") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(url) = std::env::var("DEVGODZILLA_DB_URL") {
        let path = url
            .strip_prefix("file://")
            .or_else(|| url.strip_prefix("sqlite://"))
            .unwrap_or(&url);
        return Ok(PathBuf::from(path));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("devgodzilla"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/devgodzilla"))
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

fn bool_var(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn list_var(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
