//! # mailvault-query
//!
//! Query layer for the mailvault message archive.
//!
//! Two engines answer the same [`Engine`] contract:
//! - [`SqliteEngine`] reads the normalized relational store through `sqlx`.
//! - [`DuckDbEngine`] scans the partitioned Parquet analytics cache through
//!   DuckDB, delegating detail and full-text lookups to an optional
//!   [`SqliteEngine`] or to DuckDB's own SQLite scanner.
//!
//! Both engines share one set of statement builders, so grouping keys,
//! drill-down filters and search translation stay equivalent across
//! backends. [`open_engine`] picks the backend once from an
//! [`EngineConfig`].
//!
//! ```no_run
//! use mailvault_query::{AggregateOptions, Engine, EngineConfig, ViewType, open_engine};
//!
//! # async fn run() -> mailvault_query::Result<()> {
//! let config = EngineConfig::load("mailvault.json")?;
//! let engine = open_engine(&config).await?;
//! let senders = engine
//!     .aggregate(ViewType::Senders, &AggregateOptions::default())
//!     .await?;
//! for row in senders {
//!     println!("{} {}", row.key, row.count);
//! }
//! engine.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod analytics;
mod columnar;
mod config;
mod engine;
mod error;
mod fetch;
mod filter;
mod model;
mod row;
pub mod search;
mod sql;
mod sqlite;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testutil;

pub use config::{DuckDbOptions, EngineConfig, open_engine};
pub use columnar::DuckDbEngine;
pub use engine::{AnyEngine, Engine};
pub use error::{Error, QuerySource, Result};
pub use filter::{
    AggregateOptions, MessageFilter, MessageSortField, MessageSorting, Pagination, SortDirection,
    SortField, StatsOptions, TimeGranularity, TimeRange, ViewType,
};
pub use model::{
    AccountInfo, Address, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary,
    MessageType, SearchFastResult, TotalStats,
};
pub use search::SearchQuery;
pub use sqlite::SqliteEngine;
