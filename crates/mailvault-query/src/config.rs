//! Engine configuration and backend selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analytics;
use crate::columnar::DuckDbEngine;
use crate::engine::AnyEngine;
use crate::error::{Error, Result};
use crate::sqlite::SqliteEngine;

/// Columnar engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDbOptions {
    /// Worker threads; defaults to the available parallelism.
    pub threads: Option<usize>,
    /// Never attach the relational store through DuckDB's SQLite scanner.
    pub disable_sqlite_scanner: bool,
}

/// Where the archive lives and which backend to prefer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relational store.
    pub database_path: Option<PathBuf>,
    /// Parquet analytics cache.
    pub analytics_dir: Option<PathBuf>,
    /// Columnar engine settings.
    pub duckdb: DuckDbOptions,
    /// Use the columnar engine when the cache is complete.
    pub prefer_columnar: bool,
}

impl EngineConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Analytics directory when it holds every cached table.
    fn complete_cache(&self) -> Option<&Path> {
        self.analytics_dir
            .as_deref()
            .filter(|dir| analytics::has_complete_parquet_data(dir))
    }
}

/// Opens the backend `config` selects.
///
/// The columnar engine is used when preferred and the cache is complete,
/// with the relational store as its fallback when one is configured.
/// Otherwise the relational store is opened directly.
///
/// # Errors
///
/// Returns [`Error::Config`] when no usable source is configured, or the
/// error from opening the chosen backend.
pub async fn open_engine(config: &EngineConfig) -> Result<AnyEngine> {
    let database = config.database_path.as_deref();

    if config.prefer_columnar
        && let Some(dir) = config.complete_cache()
    {
        let sqlite = match database {
            Some(path) => Some(SqliteEngine::open(path).await?),
            None => None,
        };
        debug!(dir = %dir.display(), relational = sqlite.is_some(), "selected columnar backend");
        let engine = DuckDbEngine::open(dir, database, sqlite, &config.duckdb).await?;
        return Ok(engine.into());
    }

    match database {
        Some(path) => {
            debug!(path = %path.display(), "selected relational backend");
            Ok(SqliteEngine::open(path).await?.into())
        }
        None if config.prefer_columnar => Err(Error::Config(
            "analytics cache is incomplete and no database is configured".to_string(),
        )),
        None => Err(Error::Config("no database configured".to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::{write_parquet, write_sqlite_file};
    use crate::{Engine, MessageFilter};

    #[test]
    fn test_parse_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());

        let config = EngineConfig::from_json_str(
            r#"{"database_path": "/data/msgs.db", "duckdb": {"threads": 4}, "prefer_columnar": true}"#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/data/msgs.db")));
        assert_eq!(config.duckdb.threads, Some(4));
        assert!(!config.duckdb.disable_sqlite_scanner);
        assert!(config.prefer_columnar);
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            EngineConfig::from_json_str("{\"prefer_columnar\": 1}"),
            Err(Error::Serde(_))
        ));
        assert!(matches!(
            EngineConfig::load("/nonexistent/mailvault.json"),
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_no_source_is_config_error() {
        let err = open_engine(&EngineConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            analytics_dir: Some(dir.path().to_path_buf()),
            prefer_columnar: true,
            ..EngineConfig::default()
        };
        let err = open_engine(&config).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_backend_selection() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("msgvault.db");
        let analytics_dir = dir.path().join("analytics");
        write_sqlite_file(&database).await;

        let mut config = EngineConfig {
            database_path: Some(database),
            analytics_dir: Some(analytics_dir.clone()),
            duckdb: DuckDbOptions {
                threads: Some(1),
                disable_sqlite_scanner: true,
            },
            prefer_columnar: true,
        };

        // Incomplete cache falls back to the relational store.
        let engine = open_engine(&config).await.unwrap();
        assert_eq!(engine.backend(), "sqlite");
        engine.close().await.unwrap();

        std::fs::create_dir_all(&analytics_dir).unwrap();
        write_parquet(&analytics_dir);
        let engine = open_engine(&config).await.unwrap();
        assert_eq!(engine.backend(), "duckdb");
        let ids = engine
            .get_gmail_ids_by_filter(&MessageFilter::new())
            .await
            .unwrap();
        assert_eq!(ids.len(), 5);
        engine.close().await.unwrap();

        config.prefer_columnar = false;
        let engine = open_engine(&config).await.unwrap();
        assert_eq!(engine.backend(), "sqlite");
        engine.close().await.unwrap();
    }
}
