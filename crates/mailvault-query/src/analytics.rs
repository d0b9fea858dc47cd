//! Analytics cache layout helpers.
//!
//! The cache builder writes one directory of Parquet files per table under
//! the analytics directory, `messages` partitioned as `year=*/`, plus a
//! `_last_sync.json` recording how far the export got.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Table directories that must each hold at least one Parquet file before
/// the columnar engine can open the cache.
pub const REQUIRED_PARQUET_DIRS: [&str; 8] = [
    "messages",
    "sources",
    "participants",
    "message_recipients",
    "labels",
    "message_labels",
    "attachments",
    "conversations",
];

/// Name of the sync state file inside the analytics directory.
pub const SYNC_STATE_FILE: &str = "_last_sync.json";

fn is_parquet(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "parquet")
}

/// Whether `dir` holds a Parquet file directly, or one level down when
/// `nested` is set.
fn holds_parquet(dir: &Path, nested: bool) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        is_parquet(&path) || (nested && path.is_dir() && holds_parquet(&path, false))
    })
}

/// Whether the messages table has been exported at all.
#[must_use]
pub fn has_parquet_data(analytics_dir: &Path) -> bool {
    holds_parquet(&analytics_dir.join("messages"), true)
}

/// Whether every table the columnar engine reads has been exported.
#[must_use]
pub fn has_complete_parquet_data(analytics_dir: &Path) -> bool {
    REQUIRED_PARQUET_DIRS
        .iter()
        .all(|table| holds_parquet(&analytics_dir.join(table), *table == "messages"))
}

/// Progress of the last cache export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Highest message id exported.
    pub last_message_id: i64,
    /// When the export finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Reads the state under `analytics_dir`; `None` when no export has
    /// recorded one yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(analytics_dir: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(analytics_dir.join(SYNC_STATE_FILE)) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the state under `analytics_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, analytics_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(analytics_dir.join(SYNC_STATE_FILE), json)?;
        Ok(())
    }
}
