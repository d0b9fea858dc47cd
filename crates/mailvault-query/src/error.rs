//! Error types for the query layer.

use thiserror::Error;

/// Errors that can occur while answering a query.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs a backend capability that was not supplied at
    /// construction, or the engine configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An enum code reached a translator that does not know it.
    #[error("Unsupported {kind}: {value}")]
    Unsupported {
        /// Which closed set the value was checked against.
        kind: &'static str,
        /// The offending value as received.
        value: String,
    },

    /// The underlying query failed.
    #[error("{stage}: {source}")]
    Query {
        /// Name of the failing stage, e.g. "aggregate query".
        stage: &'static str,
        /// Backend error.
        #[source]
        source: QuerySource,
    },

    /// Raw body recovery failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailvault_mime::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A lock guarding backend state was poisoned by a panicking holder.
    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),

    /// A blocking backend call panicked or was shut down.
    #[error("Backend task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The caller stopped waiting before the statement ran.
    #[error("Query interrupted")]
    Interrupted,
}

/// Backend error wrapped by [`Error::Query`].
#[derive(Debug, Error)]
pub enum QuerySource {
    /// Row-oriented store.
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Columnar engine.
    #[error("duckdb: {0}")]
    DuckDb(#[from] duckdb::Error),
}

impl Error {
    pub(crate) fn unsupported(kind: &'static str, value: impl ToString) -> Self {
        Self::Unsupported {
            kind,
            value: value.to_string(),
        }
    }
}

/// Attaches a stage name to backend results.
pub(crate) trait StageExt<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T, E: Into<QuerySource>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|e| Error::Query {
            stage,
            source: e.into(),
        })
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
