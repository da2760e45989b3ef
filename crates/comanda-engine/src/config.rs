//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     COMANDA_RETRY_MAX_ATTEMPTS=5                                       │
//! │     COMANDA_SWEEP_ENABLED=false                                        │
//! │     COMANDA_SWEEP_CUTOFF=03:30                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $COMANDA_CONFIG, or ./comanda.toml if present                      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # comanda.toml
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 25
//! max_backoff_ms = 250
//!
//! [sweep]
//! enabled = true
//! cutoff = "04:00"   # local time, UTC−5
//!
//! [notifications]
//! channel_capacity = 256
//! ```
//!
//! Per-tenant business limits (edit/cancel windows) are data, not
//! configuration: they live in the `tenant_settings` table.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use comanda_db::RetryPolicy;

use crate::error::{EngineError, EngineResult};

const DEFAULT_CONFIG_FILE: &str = "comanda.toml";
const CUTOFF_FORMAT: &str = "%H:%M";

// =============================================================================
// Retry Settings
// =============================================================================

/// Bound and pacing of the lock-timeout retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    25
}
fn default_max_backoff() -> u64 {
    250
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Sweep Settings
// =============================================================================

/// Daily automatic close of every shift still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local (UTC−5) wall-clock time, `HH:MM`.
    #[serde(default = "default_cutoff")]
    pub cutoff: String,
}

fn default_true() -> bool {
    true
}

fn default_cutoff() -> String {
    "04:00".to_string()
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            enabled: true,
            cutoff: default_cutoff(),
        }
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Broadcast buffer; slow subscribers lag past this many events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub sweep: SweepSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    /// Loads configuration: file (explicit path, `COMANDA_CONFIG`, or
    /// `./comanda.toml`), then environment overrides, then validation.
    pub fn load(path: Option<PathBuf>) -> EngineResult<Self> {
        let path = path.or_else(|| std::env::var_os("COMANDA_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file, using defaults");
                EngineConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            max_attempts = config.retry.max_attempts,
            sweep_enabled = config.sweep.enabled,
            cutoff = %config.sweep.cutoff,
            "Engine configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        debug!(path = %path.display(), "Loading engine config");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) -> EngineResult<()> {
        if let Ok(value) = std::env::var("COMANDA_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = value.parse().map_err(|_| {
                EngineError::InvalidConfig(format!("COMANDA_RETRY_MAX_ATTEMPTS: '{value}'"))
            })?;
        }
        if let Ok(value) = std::env::var("COMANDA_SWEEP_ENABLED") {
            self.sweep.enabled = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("COMANDA_SWEEP_CUTOFF") {
            self.sweep.cutoff = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(EngineError::InvalidConfig(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        if self.notifications.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "notifications.channel_capacity must be positive".into(),
            ));
        }
        self.cutoff_time()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    /// Parsed sweep cutoff.
    pub fn cutoff_time(&self) -> EngineResult<NaiveTime> {
        NaiveTime::parse_from_str(&self.sweep.cutoff, CUTOFF_FORMAT).map_err(|_| {
            EngineError::InvalidConfig(format!(
                "sweep.cutoff must be HH:MM, got '{}'",
                self.sweep.cutoff
            ))
        })
    }
}
