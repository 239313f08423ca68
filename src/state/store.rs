use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::MonitorState;
use crate::monitors::MonitorKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state for monitor {monitor_id} is corrupt: {message}")]
    Corrupt { monitor_id: String, message: String },
    #[error("state file {path} is not a JSON object: {message}")]
    CorruptFile { path: PathBuf, message: String },
    #[error("state file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Corrupt { .. } | Self::CorruptFile { .. } => "store_corrupt",
            Self::Io { .. } | Self::Serialize(_) => "store_io",
        }
    }
}

/// JSON file mapping monitor id to that monitor's state record.
///
/// Records are held as raw JSON so that a record this process cannot decode
/// is still written back untouched when another monitor commits.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: BTreeMap<String, Value>,
    seen_thread_cap: Option<usize>,
}

impl StateStore {
    /// Open the state file, treating a missing file as an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object. The file is left as it is in that case.
    pub async fn open(path: &Path, seen_thread_cap: Option<usize>) -> Result<Self, StoreError> {
        let records = match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                serde_json::from_str::<BTreeMap<String, Value>>(&raw).map_err(|e| {
                    StoreError::CorruptFile {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "State file not found, starting with empty state");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        debug!(path = %path.display(), monitors = records.len(), "Loaded state");

        Ok(Self {
            path: path.to_path_buf(),
            records,
            seen_thread_cap,
        })
    }

    /// True when no monitor has committed state yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load the state of one monitor.
    ///
    /// Returns `Ok(None)` when the monitor has never committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when a record exists but does not
    /// decode as the variant for `kind`. Callers must not treat this as
    /// absent state.
    pub fn load(
        &self,
        monitor_id: &str,
        kind: MonitorKind,
    ) -> Result<Option<MonitorState>, StoreError> {
        let Some(value) = self.records.get(monitor_id) else {
            return Ok(None);
        };

        MonitorState::from_value(kind, value.clone())
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                monitor_id: monitor_id.to_string(),
                message: format!("expected {} record: {e}", kind.as_str()),
            })
    }

    /// Replace the record of one monitor and persist the whole map.
    ///
    /// The file is replaced atomically; on failure both the file and the
    /// in-memory view keep their previous contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    pub async fn commit(&mut self, monitor_id: &str, state: MonitorState) -> Result<(), StoreError> {
        let state = match (state, self.seen_thread_cap) {
            (MonitorState::Section(mut section), Some(cap)) => {
                let evicted = section.enforce_cap(cap);
                if evicted > 0 {
                    debug!(monitor_id = %monitor_id, evicted, cap, "Evicted oldest seen thread ids");
                }
                MonitorState::Section(section)
            }
            (state, _) => state,
        };

        let mut records = self.records.clone();
        records.insert(monitor_id.to_string(), serde_json::to_value(&state)?);
        let serialized = serde_json::to_string_pretty(&records)?;

        write_atomically(&self.path, serialized.into_bytes()).await?;

        self.records = records;
        debug!(monitor_id = %monitor_id, path = %self.path.display(), "State committed");
        Ok(())
    }
}

async fn write_atomically(path: &Path, contents: Vec<u8>) -> Result<(), StoreError> {
    let target = path.to_path_buf();

    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .unwrap_or_else(|join_err| {
        warn!("State write task failed: {join_err}");
        Err(std::io::Error::other(join_err.to_string()))
    });

    result.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
