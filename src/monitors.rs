//! Monitor definitions file.
//!
//! The file is either JSON or TOML (chosen by extension) and holds a
//! `monitors` array. Each entry is validated on its own so one broken
//! definition never prevents the others from running.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// What a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// New threads in a forum section.
    SectionWatch,
    /// New replies in a single thread.
    ThreadWatch,
}

impl MonitorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SectionWatch => "section",
            Self::ThreadWatch => "thread",
        }
    }
}

/// A validated monitor definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Unique key into the state store.
    pub id: String,
    /// Display name used in notifications.
    pub name: String,
    pub kind: MonitorKind,
    /// Base URL of the forum (used for login).
    pub forum_url: String,
    /// Section URL or thread URL, depending on `kind`.
    pub target_url: String,
    /// Name of the environment variable holding the webhook URL, if overridden.
    pub webhook_env: Option<String>,
    pub enabled: bool,
}

impl MonitorConfig {
    /// Resolve the webhook URL for this monitor from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn resolve_webhook(&self, default_env: &str) -> Result<String, ConfigError> {
        let var = self.webhook_env.as_deref().unwrap_or(default_env);
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::InvalidMonitor {
                id: self.id.clone(),
                message: format!("environment variable {var} not set"),
            })
    }
}

/// Raw entry as written in the monitors file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorEntry {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub forum_url: Option<String>,
    pub section_url: Option<String>,
    pub thread_url: Option<String>,
    pub discord_webhook_env: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MonitorsFile {
    monitors: Vec<MonitorEntry>,
}

impl MonitorEntry {
    /// Label used in logs when the entry may not have a usable id.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map_or_else(|| format!("<monitor #{index}>"), ToString::to_string)
    }

    /// Turn the raw entry into a [`MonitorConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the id, forum URL or the URL required by the
    /// declared type is missing, or the type is unknown.
    pub fn validate(&self, index: usize) -> Result<MonitorConfig, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidMonitor {
            id: self.label(index),
            message: message.to_string(),
        };

        let id = non_empty(self.id.as_deref()).ok_or_else(|| invalid("missing id"))?;
        let forum_url =
            non_empty(self.forum_url.as_deref()).ok_or_else(|| invalid("missing forum_url"))?;

        let kind = match self.kind.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("thread") => MonitorKind::ThreadWatch,
            Some("forum" | "section") => MonitorKind::SectionWatch,
            Some(other) => {
                return Err(invalid(&format!(
                    "type must be 'forum' or 'thread', got '{other}'"
                )))
            }
        };

        let target_url = match kind {
            MonitorKind::SectionWatch => non_empty(self.section_url.as_deref())
                .ok_or_else(|| invalid("section_url required for forum monitor"))?,
            MonitorKind::ThreadWatch => non_empty(self.thread_url.as_deref())
                .ok_or_else(|| invalid("thread_url required for thread monitor"))?,
        };

        for (field, value) in [("forum_url", &forum_url), ("target url", &target_url)] {
            if url::Url::parse(value).is_err() {
                return Err(invalid(&format!("{field} is not a valid URL: {value}")));
            }
        }

        Ok(MonitorConfig {
            id,
            name: non_empty(self.name.as_deref()).unwrap_or_else(|| "Monitor".to_string()),
            kind,
            forum_url,
            target_url,
            webhook_env: non_empty(self.discord_webhook_env.as_deref()),
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Read and parse the monitors file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid monitors
/// document. Individual entries are not validated here.
pub fn load_entries(path: &Path) -> Result<Vec<MonitorEntry>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadMonitors {
        path: path.to_path_buf(),
        source,
    })?;
    parse_entries(path, &raw)
}

fn parse_entries(path: &Path, raw: &str) -> Result<Vec<MonitorEntry>, ConfigError> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let parsed: MonitorsFile = if is_toml {
        toml::from_str(raw).map_err(|e| ConfigError::ParseMonitors {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseMonitors {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    Ok(parsed.monitors)
}

/// Outcome of checking one monitors-file entry.
#[derive(Debug)]
pub enum EntryCheck {
    Enabled(MonitorConfig),
    /// Switched off; the rest of the definition is not checked.
    Disabled,
    Invalid(ConfigError),
}

/// Check every entry, in file order, paired with its label.
///
/// Disabled entries are reported as such without validation. Among enabled
/// entries, a repeated id is rejected after its first occurrence.
#[must_use]
pub fn validate_entries(entries: &[MonitorEntry]) -> Vec<(String, EntryCheck)> {
    let mut seen_ids = HashSet::new();

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let label = entry.label(index);
            if entry.enabled == Some(false) {
                return (label, EntryCheck::Disabled);
            }

            let check = match entry.validate(index) {
                Ok(config) if seen_ids.insert(config.id.clone()) => EntryCheck::Enabled(config),
                Ok(config) => EntryCheck::Invalid(ConfigError::InvalidMonitor {
                    id: config.id,
                    message: "duplicate monitor id".to_string(),
                }),
                Err(e) => EntryCheck::Invalid(e),
            };
            (label, check)
        })
        .collect()
}
