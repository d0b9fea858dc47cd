//! Columnar engine over the Parquet analytics cache.
//!
//! Aggregates, lists and metadata search scan the cache. Message detail,
//! attachments, full search and deletion staging need the relational
//! store: they go to the [`SqliteEngine`] when one was supplied, else to
//! DuckDB's SQLite scanner when it could be attached.

mod cache;
mod schema;
mod session;

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DuckDbOptions;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::fetch;
use crate::filter::{AggregateOptions, MessageFilter, StatsOptions, ViewType};
use crate::model::{
    AccountInfo, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary, SearchFastResult,
    TotalStats,
};
use crate::row;
use crate::search::SearchQuery;
use crate::sql::{self, MessageKey, Source};
use crate::sqlite::SqliteEngine;

use cache::SearchCache;
use session::{Columnar, Session};

/// Engine over the Parquet analytics cache.
#[derive(Debug)]
pub struct DuckDbEngine {
    session: Session,
    parquet: Source,
    /// Relational store through the scanner, when attached.
    scanner: Option<Source>,
    sqlite: Option<SqliteEngine>,
    cache: Mutex<SearchCache>,
    analytics_dir: PathBuf,
}

impl DuckDbEngine {
    /// Opens the cache under `analytics_dir`.
    ///
    /// `sqlite_path` enables the SQLite scanner unless disabled in `opts`;
    /// `sqlite` is the relational engine detail lookups prefer.
    ///
    /// # Errors
    ///
    /// Returns an error if DuckDB cannot be started or the cache lacks a
    /// required table or column.
    pub async fn open(
        analytics_dir: impl Into<PathBuf>,
        sqlite_path: Option<&Path>,
        sqlite: Option<SqliteEngine>,
        opts: &DuckDbOptions,
    ) -> Result<Self> {
        let analytics_dir = analytics_dir.into();
        let threads = opts.threads.unwrap_or_else(default_threads);
        let session = Session::open(threads).await?;

        let scanner_enabled = match sqlite_path {
            Some(path) if !opts.disable_sqlite_scanner && !cfg!(windows) => {
                session.attach_sqlite(path).await?
            }
            _ => false,
        };
        debug!(enabled = scanner_enabled, "sqlite scanner probe");

        let ctes = schema::probe(&session, &analytics_dir).await?;
        info!(
            dir = %analytics_dir.display(),
            threads,
            scanner = scanner_enabled,
            relational = sqlite.is_some(),
            "columnar engine opened"
        );

        Ok(Self {
            session,
            parquet: Source::Parquet(ctes),
            scanner: scanner_enabled.then_some(Source::Scanner),
            sqlite,
            cache: Mutex::new(SearchCache::default()),
            analytics_dir,
        })
    }

    /// Directory the cache is read from.
    #[must_use]
    pub fn analytics_dir(&self) -> &Path {
        &self.analytics_dir
    }

    /// Whether the relational store is reachable through the scanner.
    #[must_use]
    pub const fn has_sqlite_scanner(&self) -> bool {
        self.scanner.is_some()
    }

    /// How many times a search has been materialized.
    pub async fn materialization_count(&self) -> u64 {
        self.cache.lock().await.materializations()
    }

    const fn cached(&self) -> Columnar<'_> {
        Columnar {
            session: &self.session,
            source: &self.parquet,
        }
    }

    fn scanned(&self) -> Option<Columnar<'_>> {
        self.scanner.as_ref().map(|source| Columnar {
            session: &self.session,
            source,
        })
    }

    fn needs_relational(operation: &str) -> Error {
        Error::Config(format!("{operation} needs the relational store"))
    }

    async fn detail(&self, key: MessageKey<'_>) -> Result<Option<MessageDetail>> {
        if let Some(sqlite) = &self.sqlite {
            return fetch::message_detail(sqlite, key).await;
        }
        match self.scanned() {
            Some(scanner) => fetch::message_detail(&scanner, key).await,
            None => Err(Self::needs_relational("message detail")),
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

impl Engine for DuckDbEngine {
    async fn aggregate(
        &self,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        fetch::aggregate(&self.cached(), view, opts, None).await
    }

    async fn sub_aggregate(
        &self,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        fetch::aggregate(&self.cached(), view, opts, Some(filter)).await
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>> {
        fetch::list_messages(&self.cached(), filter).await
    }

    async fn get_message(&self, id: i64) -> Result<Option<MessageDetail>> {
        self.detail(MessageKey::Id(id)).await
    }

    async fn get_message_by_source_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<MessageDetail>> {
        self.detail(MessageKey::SourceId(source_message_id)).await
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<AttachmentInfo>> {
        if let Some(sqlite) = &self.sqlite {
            return sqlite.get_attachment(id).await;
        }
        match self.scanned() {
            Some(scanner) => fetch::attachment(&scanner, id).await,
            None => Err(Self::needs_relational("attachment lookup")),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>> {
        fetch::accounts(&self.cached()).await
    }

    async fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        if let Some(sqlite) = &self.sqlite {
            return sqlite.search(query, limit, offset).await;
        }
        // The scanner cannot reach FTS5 tables, so free text falls back to
        // pattern matching on either remaining path.
        match self.scanned() {
            Some(scanner) => fetch::search(&scanner, query, limit, offset, false).await,
            None => fetch::search(&self.cached(), query, limit, offset, false).await,
        }
    }

    async fn search_fast(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        fetch::search_fast(&self.cached(), query, filter, limit, offset).await
    }

    async fn search_fast_count(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
    ) -> Result<i64> {
        fetch::search_fast_count(&self.cached(), query, filter).await
    }

    async fn search_fast_with_stats(
        &self,
        query: &SearchQuery,
        raw_query: &str,
        filter: &MessageFilter,
        stats_view: ViewType,
        limit: usize,
        offset: usize,
    ) -> Result<SearchFastResult> {
        debug!(query = raw_query, view = %stats_view, limit, offset, "search with stats");
        let conds = fetch::fast_conditions(&self.parquet, query, filter);

        let mut cache = self.cache.lock().await;
        let table = cache.ensure(&self.session, &self.parquet, &conds).await?;
        let mut messages = cache
            .page(&self.session, &table, fetch::search_limit(limit), offset)
            .await?;
        fetch::attach_labels(&self.cached(), &mut messages).await?;

        Ok(SearchFastResult {
            messages,
            total_count: cache.count(),
            stats: cache.stats(),
        })
    }

    async fn get_gmail_ids_by_filter(&self, filter: &MessageFilter) -> Result<Vec<String>> {
        if let Some(sqlite) = &self.sqlite {
            return sqlite.get_gmail_ids_by_filter(filter).await;
        }
        match self.scanned() {
            Some(scanner) => fetch::gmail_ids(&scanner, filter).await,
            None => Err(Self::needs_relational("deletion staging")),
        }
    }

    async fn get_total_stats(&self, opts: &StatsOptions) -> Result<TotalStats> {
        let conds = fetch::stats_conditions(&self.parquet, opts);
        let (mut stats, accounts) = self
            .session
            .query(
                "message stats",
                &sql::message_stats(&self.parquet, &conds),
                row::message_stats,
            )
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        stats.account_count = accounts;
        stats.label_count = match self
            .session
            .query(
                "label count",
                &sql::matched_label_count(&self.parquet, &conds),
                row::single_int,
            )
            .await
        {
            Ok(rows) => rows.into_iter().next().unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "label count failed");
                0
            }
        };
        Ok(stats)
    }

    async fn close(self) -> Result<()> {
        self.cache.into_inner().clear(&self.session).await;
        if let Some(sqlite) = self.sqlite {
            sqlite.close().await?;
        }
        self.session.close()
    }
}
