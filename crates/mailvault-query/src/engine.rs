//! The engine contract and backend dispatch.

use crate::columnar::DuckDbEngine;
use crate::error::Result;
use crate::filter::{AggregateOptions, MessageFilter, StatsOptions, ViewType};
use crate::model::{
    AccountInfo, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary, SearchFastResult,
    TotalStats,
};
use crate::search::SearchQuery;
use crate::sqlite::SqliteEngine;

/// Read operations over the archive, answered identically by every backend.
///
/// Single-entity lookups return `Ok(None)` when nothing matches. Failures
/// of the underlying query surface as [`crate::Error::Query`] naming the
/// stage that failed. Dropping a returned future abandons the call.
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Groups messages by `view`.
    async fn aggregate(&self, view: ViewType, opts: &AggregateOptions)
    -> Result<Vec<AggregateRow>>;

    /// Groups the messages selected by a drill-down `filter` by `view`.
    async fn sub_aggregate(
        &self,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>>;

    /// One page of the messages selected by `filter`, labels included.
    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>>;

    /// Full message by relational id.
    async fn get_message(&self, id: i64) -> Result<Option<MessageDetail>>;

    /// Full message by the id its source assigned.
    async fn get_message_by_source_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<MessageDetail>>;

    /// Attachment metadata by id.
    async fn get_attachment(&self, id: i64) -> Result<Option<AttachmentInfo>>;

    /// Every configured account, ordered by identifier.
    async fn list_accounts(&self) -> Result<Vec<AccountInfo>>;

    /// Full search, including free text through the FTS index when present.
    /// A zero `limit` means 100.
    async fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>>;

    /// Metadata-only search within a drill-down. A zero `limit` means 100.
    async fn search_fast(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>>;

    /// Number of messages [`Engine::search_fast`] would return unpaged.
    async fn search_fast_count(&self, query: &SearchQuery, filter: &MessageFilter)
    -> Result<i64>;

    /// One page of a metadata search with its total count and statistics.
    ///
    /// `raw_query` is the text the query was parsed from; it is only logged.
    /// Count and statistics are best-effort: `-1` and `None` mean they
    /// could not be computed.
    async fn search_fast_with_stats(
        &self,
        query: &SearchQuery,
        raw_query: &str,
        filter: &MessageFilter,
        stats_view: ViewType,
        limit: usize,
        offset: usize,
    ) -> Result<SearchFastResult>;

    /// Source message ids of the live messages selected by `filter`, for
    /// staging deletions. Deletion state always comes from the relational
    /// store.
    async fn get_gmail_ids_by_filter(&self, filter: &MessageFilter) -> Result<Vec<String>>;

    /// Archive-wide statistics.
    async fn get_total_stats(&self, opts: &StatsOptions) -> Result<TotalStats>;

    /// Releases backend resources.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// The backend chosen at construction.
#[derive(Debug)]
pub enum AnyEngine {
    /// Relational store only.
    Row(SqliteEngine),
    /// Parquet cache, optionally backed by the relational store.
    Columnar(DuckDbEngine),
}

impl AnyEngine {
    /// Short backend name for logs and status lines.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Row(_) => "sqlite",
            Self::Columnar(_) => "duckdb",
        }
    }
}

impl From<SqliteEngine> for AnyEngine {
    fn from(engine: SqliteEngine) -> Self {
        Self::Row(engine)
    }
}

impl From<DuckDbEngine> for AnyEngine {
    fn from(engine: DuckDbEngine) -> Self {
        Self::Columnar(engine)
    }
}

impl Engine for AnyEngine {
    async fn aggregate(
        &self,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        match self {
            Self::Row(e) => e.aggregate(view, opts).await,
            Self::Columnar(e) => e.aggregate(view, opts).await,
        }
    }

    async fn sub_aggregate(
        &self,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        match self {
            Self::Row(e) => e.sub_aggregate(filter, view, opts).await,
            Self::Columnar(e) => e.sub_aggregate(filter, view, opts).await,
        }
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>> {
        match self {
            Self::Row(e) => e.list_messages(filter).await,
            Self::Columnar(e) => e.list_messages(filter).await,
        }
    }

    async fn get_message(&self, id: i64) -> Result<Option<MessageDetail>> {
        match self {
            Self::Row(e) => e.get_message(id).await,
            Self::Columnar(e) => e.get_message(id).await,
        }
    }

    async fn get_message_by_source_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<MessageDetail>> {
        match self {
            Self::Row(e) => e.get_message_by_source_id(source_message_id).await,
            Self::Columnar(e) => e.get_message_by_source_id(source_message_id).await,
        }
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<AttachmentInfo>> {
        match self {
            Self::Row(e) => e.get_attachment(id).await,
            Self::Columnar(e) => e.get_attachment(id).await,
        }
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>> {
        match self {
            Self::Row(e) => e.list_accounts().await,
            Self::Columnar(e) => e.list_accounts().await,
        }
    }

    async fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        match self {
            Self::Row(e) => e.search(query, limit, offset).await,
            Self::Columnar(e) => e.search(query, limit, offset).await,
        }
    }

    async fn search_fast(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        match self {
            Self::Row(e) => e.search_fast(query, filter, limit, offset).await,
            Self::Columnar(e) => e.search_fast(query, filter, limit, offset).await,
        }
    }

    async fn search_fast_count(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
    ) -> Result<i64> {
        match self {
            Self::Row(e) => e.search_fast_count(query, filter).await,
            Self::Columnar(e) => e.search_fast_count(query, filter).await,
        }
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
        match self {
            Self::Row(e) => {
                e.search_fast_with_stats(query, raw_query, filter, stats_view, limit, offset)
                    .await
            }
            Self::Columnar(e) => {
                e.search_fast_with_stats(query, raw_query, filter, stats_view, limit, offset)
                    .await
            }
        }
    }

    async fn get_gmail_ids_by_filter(&self, filter: &MessageFilter) -> Result<Vec<String>> {
        match self {
            Self::Row(e) => e.get_gmail_ids_by_filter(filter).await,
            Self::Columnar(e) => e.get_gmail_ids_by_filter(filter).await,
        }
    }

    async fn get_total_stats(&self, opts: &StatsOptions) -> Result<TotalStats> {
        match self {
            Self::Row(e) => e.get_total_stats(opts).await,
            Self::Columnar(e) => e.get_total_stats(opts).await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Self::Row(e) => e.close().await,
            Self::Columnar(e) => e.close().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::{sqlite_engine, write_parquet};
    use crate::DuckDbOptions;

    #[tokio::test]
    async fn test_dispatch_reaches_each_backend() {
        let row = AnyEngine::from(sqlite_engine().await);
        assert_eq!(row.backend(), "sqlite");

        let dir = tempfile::tempdir().unwrap();
        write_parquet(dir.path());
        let opts = DuckDbOptions {
            threads: Some(1),
            disable_sqlite_scanner: true,
        };
        let columnar =
            AnyEngine::from(DuckDbEngine::open(dir.path(), None, None, &opts).await.unwrap());
        assert_eq!(columnar.backend(), "duckdb");

        let opts = AggregateOptions::default();
        for view in [ViewType::Labels, ViewType::Time] {
            assert_eq!(
                row.aggregate(view, &opts).await.unwrap(),
                columnar.aggregate(view, &opts).await.unwrap()
            );
        }
        assert_eq!(row.list_accounts().await.unwrap().len(), 2);
        assert!(row.get_message(2).await.unwrap().is_some());
        assert!(columnar.get_message(2).await.is_err());

        row.close().await.unwrap();
        columnar.close().await.unwrap();
    }
}
