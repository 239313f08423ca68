use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to read monitors file {path}: {source}")]
    ReadMonitors {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse monitors file {path}: {message}")]
    ParseMonitors { path: PathBuf, message: String },
    #[error("monitor {id}: {message}")]
    InvalidMonitor { id: String, message: String },
}

/// Application configuration loaded from environment variables.
///
/// Monitor definitions live in a separate file (see [`crate::monitors`]).
#[derive(Debug, Clone)]
pub struct Config {
    // Forum credentials
    pub forum_username: String,
    pub forum_password: String,

    // Files
    pub monitors_file: PathBuf,
    pub state_file: PathBuf,

    // Timeouts
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,

    // State
    pub seen_thread_cap: Option<usize>,

    // Notifications
    pub default_webhook_env: String,
    pub notify_batch_size: usize,
    pub notify_batch_pause: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cap = parse_env_usize("SEEN_THREAD_CAP", 2000)?;

        Ok(Self {
            // Forum credentials
            forum_username: required_env_or("FORUM_USERNAME", "FOROACTIVO_USERNAME")?,
            forum_password: required_env_or("FORUM_PASSWORD", "FOROACTIVO_PASSWORD")?,

            // Files
            monitors_file: PathBuf::from(env_or_default("MONITORS_FILE", "config/monitors.json")),
            state_file: PathBuf::from(env_or_default("STATE_FILE", "state.json")),

            // Timeouts
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 30)?),
            notify_timeout: Duration::from_secs(parse_env_u64("NOTIFY_TIMEOUT_SECS", 10)?),

            // State
            seen_thread_cap: (cap > 0).then_some(cap),

            // Notifications
            default_webhook_env: env_or_default("DEFAULT_WEBHOOK_ENV", "DISCORD_WEBHOOK_URL"),
            notify_batch_size: parse_env_usize("NOTIFY_BATCH_SIZE", 4)?,
            notify_batch_pause: Duration::from_millis(parse_env_u64(
                "NOTIFY_BATCH_PAUSE_MS",
                2000,
            )?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forum_username.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "FORUM_USERNAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.forum_password.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "FORUM_PASSWORD".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.notify_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "NOTIFY_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.notify_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "NOTIFY_BATCH_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration with placeholder credentials, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            forum_username: "tester".to_string(),
            forum_password: "secret".to_string(),
            monitors_file: PathBuf::from("config/monitors.json"),
            state_file: PathBuf::from("state.json"),
            fetch_timeout: Duration::from_secs(5),
            notify_timeout: Duration::from_secs(5),
            seen_thread_cap: Some(2000),
            default_webhook_env: "DISCORD_WEBHOOK_URL".to_string(),
            notify_batch_size: 4,
            notify_batch_pause: Duration::ZERO,
        }
    }
}

/// Read `name`, falling back to the older `legacy` variable name.
fn required_env_or(name: &str, legacy: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .or_else(|_| std::env::var(legacy))
        .map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
