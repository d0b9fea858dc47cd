//! Row-oriented engine over the relational store.

mod fts;

use std::path::Path;

use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, query::Query};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::{QuerySource, Result, StageExt};
use crate::fetch::{self, Fetch};
use crate::filter::{AggregateOptions, MessageFilter, StatsOptions, ViewType};
use crate::model::{
    AccountInfo, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary, SearchFastResult,
    TotalStats,
};
use crate::row::Decode;
use crate::search::SearchQuery;
use crate::sql::{MessageKey, Source, SqlArg, Statement};

/// Engine over the relational store through a `sqlx` pool.
#[derive(Debug)]
pub struct SqliteEngine {
    pool: SqlitePool,
    source: Source,
    /// Whether `messages_fts` exists; set by the first successful probe.
    fts: OnceCell<bool>,
}

impl SqliteEngine {
    /// Opens the relational store at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .stage("open sqlite")?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            source: Source::Sqlite,
            fts: OnceCell::new(),
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the FTS index is available. A failed probe is not cached.
    async fn has_fts(&self) -> bool {
        match self
            .fts
            .get_or_try_init(|| fts::probe(&self.pool))
            .await
        {
            Ok(present) => *present,
            Err(e) => {
                warn!(error = %e, "FTS probe failed, using pattern search");
                false
            }
        }
    }

    fn stats_options(q: &SearchQuery, filter: &MessageFilter, view: ViewType) -> StatsOptions {
        StatsOptions {
            source_id: filter.source_id,
            with_attachments_only: filter.with_attachments_only,
            hide_deleted: filter.hide_deleted,
            search_query: Some(q.clone()),
            group_by: Some(view),
        }
    }
}

fn bind_args<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [SqlArg],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlArg::Int(v) => query.bind(*v),
            SqlArg::Text(v) => query.bind(v.as_str()),
            SqlArg::Bool(v) => query.bind(*v),
        };
    }
    query
}

impl Fetch for SqliteEngine {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn fetch<T: Send + 'static>(
        &self,
        stage: &'static str,
        stmt: &Statement,
        decode: Decode<T>,
    ) -> Result<Vec<T>> {
        let rows = bind_args(sqlx::query(&stmt.sql), &stmt.args)
            .fetch_all(&self.pool)
            .await
            .stage(stage)?;
        rows.iter()
            .map(|row| decode(row))
            .collect::<std::result::Result<Vec<_>, QuerySource>>()
            .stage(stage)
    }
}

impl Engine for SqliteEngine {
    async fn aggregate(
        &self,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        fetch::aggregate(self, view, opts, None).await
    }

    async fn sub_aggregate(
        &self,
        filter: &MessageFilter,
        view: ViewType,
        opts: &AggregateOptions,
    ) -> Result<Vec<AggregateRow>> {
        fetch::aggregate(self, view, opts, Some(filter)).await
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageSummary>> {
        fetch::list_messages(self, filter).await
    }

    async fn get_message(&self, id: i64) -> Result<Option<MessageDetail>> {
        fetch::message_detail(self, MessageKey::Id(id)).await
    }

    async fn get_message_by_source_id(
        &self,
        source_message_id: &str,
    ) -> Result<Option<MessageDetail>> {
        fetch::message_detail(self, MessageKey::SourceId(source_message_id)).await
    }

    async fn get_attachment(&self, id: i64) -> Result<Option<AttachmentInfo>> {
        fetch::attachment(self, id).await
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>> {
        fetch::accounts(self).await
    }

    async fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        let fts = !query.text_terms.is_empty() && self.has_fts().await;
        fetch::search(self, query, limit, offset, fts).await
    }

    async fn search_fast(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        fetch::search_fast(self, query, filter, limit, offset).await
    }

    async fn search_fast_count(
        &self,
        query: &SearchQuery,
        filter: &MessageFilter,
    ) -> Result<i64> {
        fetch::search_fast_count(self, query, filter).await
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
        debug!(query = raw_query, limit, offset, "search with stats");
        let messages = fetch::search_fast(self, query, filter, limit, offset).await?;

        let total_count = match fetch::search_fast_count(self, query, filter).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "search count failed");
                -1
            }
        };
        let opts = Self::stats_options(query, filter, stats_view);
        let stats = match self.get_total_stats(&opts).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "search stats failed");
                None
            }
        };

        Ok(SearchFastResult {
            messages,
            total_count,
            stats,
        })
    }

    async fn get_gmail_ids_by_filter(&self, filter: &MessageFilter) -> Result<Vec<String>> {
        fetch::gmail_ids(self, filter).await
    }

    async fn get_total_stats(&self, opts: &StatsOptions) -> Result<TotalStats> {
        fetch::relational_stats(self, opts).await
    }

    async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::sqlite_engine;
    use crate::{Error, SortField, TimeGranularity};
    use chrono::{TimeZone, Utc};

    fn keys(rows: &[AggregateRow]) -> Vec<&str> {
        rows.iter().map(|r| r.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_aggregate_senders_by_size() {
        let engine = sqlite_engine().await;
        let opts = AggregateOptions {
            sort_field: SortField::Size,
            limit: 2,
            ..AggregateOptions::default()
        };
        let rows = engine.aggregate(ViewType::Senders, &opts).await.unwrap();
        assert_eq!(keys(&rows), vec!["carol@example.com", "dave@other.org"]);
        assert_eq!(rows[0].total_size, 4000);
        // Eve has no address, so four senders remain.
        assert!(rows.iter().all(|r| r.total_unique == 4));
        assert_eq!(rows[1].attachment_count, 2);
        assert_eq!(rows[1].attachment_size, 300);
    }

    #[tokio::test]
    async fn test_aggregate_ties_break_by_key() {
        let engine = sqlite_engine().await;
        let rows = engine
            .aggregate(ViewType::Labels, &AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(keys(&rows), vec!["INBOX", "Work", "Personal"]);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].total_size, 3000);
    }

    #[tokio::test]
    async fn test_sender_names_fall_back_to_address_and_inline_sender() {
        let engine = sqlite_engine().await;
        let opts = AggregateOptions {
            sort_field: SortField::Name,
            sort_direction: crate::SortDirection::Asc,
            ..AggregateOptions::default()
        };
        let rows = engine.aggregate(ViewType::SenderNames, &opts).await.unwrap();
        assert_eq!(
            keys(&rows),
            vec!["Alice Smith", "Bob", "Eve", "carol@example.com", "dave@other.org"]
        );
    }

    #[tokio::test]
    async fn test_time_view() {
        let engine = sqlite_engine().await;
        let opts = AggregateOptions {
            granularity: TimeGranularity::Year,
            ..AggregateOptions::default()
        };
        let rows = engine.aggregate(ViewType::Time, &opts).await.unwrap();
        assert_eq!(keys(&rows), vec!["2024", "2023"]);
        assert_eq!(rows[0].count, 4);
    }

    #[tokio::test]
    async fn test_sub_aggregate_labels_within_sender() {
        let engine = sqlite_engine().await;
        let filter = MessageFilter::new().with_exact(ViewType::Senders, "alice@example.com");
        let rows = engine
            .sub_aggregate(&filter, ViewType::Labels, &AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(keys(&rows), vec!["INBOX", "Work"]);
        assert!(rows.iter().all(|r| r.count == 1));
    }

    #[tokio::test]
    async fn test_aggregate_with_search_filters_groups() {
        let engine = sqlite_engine().await;
        let opts = AggregateOptions {
            search_query: Some(SearchQuery::text(["wor"])),
            ..AggregateOptions::default()
        };
        let rows = engine.aggregate(ViewType::Labels, &opts).await.unwrap();
        assert_eq!(keys(&rows), vec!["Work"]);
    }

    #[tokio::test]
    async fn test_empty_search_query_adds_no_predicates() {
        let engine = sqlite_engine().await;
        let opts = AggregateOptions {
            search_query: Some(SearchQuery::default()),
            ..AggregateOptions::default()
        };
        let searched = engine.aggregate(ViewType::Labels, &opts).await.unwrap();
        let plain = engine
            .aggregate(ViewType::Labels, &AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(searched, plain);

        let stats = engine
            .get_total_stats(&StatsOptions {
                search_query: Some(SearchQuery::default()),
                ..StatsOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(stats.message_count, 6);
    }

    #[tokio::test]
    async fn test_empty_buckets_partition_messages() {
        let engine = sqlite_engine().await;
        let exact = MessageFilter::new().with_exact(ViewType::Labels, "work");
        let empty = MessageFilter::new().with_empty(ViewType::Labels);
        let all = engine.list_messages(&MessageFilter::new()).await.unwrap();
        let exact = engine.list_messages(&exact).await.unwrap();
        let empty = engine.list_messages(&empty).await.unwrap();

        let ids = |m: &[MessageSummary]| {
            let mut ids: Vec<i64> = m.iter().map(|m| m.id).collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(ids(&exact), vec![1, 2]);
        assert_eq!(ids(&empty), vec![3, 6]);
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_sender_considers_inline_sender() {
        let engine = sqlite_engine().await;
        let filter = MessageFilter::new().with_empty(ViewType::Senders);
        let messages = engine.list_messages(&filter).await.unwrap();
        // Eve's address is empty, so message 6 has no usable sender email.
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert!(ids.contains(&5));

        let filter = MessageFilter::new().with_empty(ViewType::SenderNames);
        let messages = engine.list_messages(&filter).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5]);
    }

    #[tokio::test]
    async fn test_list_messages_sorted_and_labeled() {
        let engine = sqlite_engine().await;
        let messages = engine.list_messages(&MessageFilter::new()).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![6, 3, 2, 1, 4, 5]);

        let first = messages.iter().find(|m| m.id == 1).unwrap();
        assert_eq!(first.labels, vec!["INBOX".to_string(), "Work".to_string()]);
        assert_eq!(first.from_email, "alice@example.com");
        assert_eq!(first.from_name, "Alice Smith");
        assert_eq!(first.attachment_count, 1);
        assert!(first.has_attachments);
        assert_eq!(
            first.sent_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
        );

        let chat = &messages[0];
        assert_eq!(chat.from_name, "Eve");
        assert_eq!(chat.from_phone.as_deref(), Some("+15551234"));
        assert_eq!(chat.conversation_title, "Family");
        assert_eq!(chat.message_type, crate::MessageType::Chat);

        let deleted = messages.iter().find(|m| m.id == 4).unwrap();
        assert!(deleted.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_period_filter_infers_granularity() {
        let engine = sqlite_engine().await;
        for (period, expected) in [("2024", 4), ("2024-01", 2), ("2024-01-15", 1)] {
            let filter = MessageFilter::new().with_exact(ViewType::Time, period);
            let messages = engine.list_messages(&filter).await.unwrap();
            assert_eq!(messages.len(), expected, "period {period}");
        }
    }

    #[tokio::test]
    async fn test_search_fast_escapes_wildcards() {
        let engine = sqlite_engine().await;
        let q = SearchQuery::text(["50%"]);
        let messages = engine
            .search_fast(&q, &MessageFilter::new(), 0, 0)
            .await
            .unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(
            engine
                .search_fast_count(&q, &MessageFilter::new())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_search_from_label_attachment() {
        let engine = sqlite_engine().await;
        let q = SearchQuery {
            from_addrs: vec!["alice@example.com".into()],
            labels: vec!["work".into()],
            has_attachment: Some(true),
            ..SearchQuery::default()
        };
        let messages = engine.search(&q, 0, 0).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 1);
        assert!(messages[0].attachment_count >= 1);
    }

    #[tokio::test]
    async fn test_full_search_labels_ignore_case_but_not_substrings() {
        let engine = sqlite_engine().await;
        let labels = |names: &[&str]| SearchQuery {
            labels: names.iter().map(ToString::to_string).collect(),
            ..SearchQuery::default()
        };
        let ids = |messages: &[MessageSummary]| messages.iter().map(|m| m.id).collect::<Vec<_>>();

        let found = engine.search(&labels(&["INBOX", "personal"]), 0, 0).await.unwrap();
        assert_eq!(ids(&found), vec![1, 4, 5]);
        let found = engine.search(&labels(&["wor"]), 0, 0).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_search_from_domain() {
        let engine = sqlite_engine().await;
        let q = SearchQuery {
            from_addrs: vec!["@EXAMPLE.com".into()],
            ..SearchQuery::default()
        };
        let ids: Vec<i64> = engine
            .search(&q, 0, 0)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_search_text_with_and_without_fts() {
        let engine = sqlite_engine().await;
        let q = SearchQuery::text(["numbers"]);
        let messages = engine.search(&q, 0, 0).await.unwrap();
        assert_eq!(messages.len(), 1);

        sqlx::raw_sql(
            "CREATE VIRTUAL TABLE messages_fts USING fts5(subject, snippet);
             INSERT INTO messages_fts (rowid, subject, snippet)
                 SELECT id, COALESCE(subject, ''), COALESCE(snippet, '') FROM messages;",
        )
        .execute(engine.pool())
        .await
        .unwrap();
        let engine = SqliteEngine::from_pool(engine.pool().clone());
        let messages = engine.search(&SearchQuery::text(["sale"]), 0, 0).await.unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_search_fast_with_stats() {
        let engine = sqlite_engine().await;
        let q = SearchQuery::text(["report"]);
        let result = engine
            .search_fast_with_stats(&q, "report", &MessageFilter::new(), ViewType::Senders, 1, 0)
            .await
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.total_count, 2);
        let stats = result.stats.unwrap();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.total_size, 3000);
    }

    #[tokio::test]
    async fn test_get_message_detail() {
        let engine = sqlite_engine().await;
        let detail = engine.get_message(1).await.unwrap().unwrap();
        assert_eq!(detail.summary.subject, "Quarterly report");
        assert_eq!(detail.body_text, "Q1 numbers are in.");
        assert_eq!(detail.from.len(), 1);
        assert_eq!(detail.from[0].name, "Alice Smith");
        assert_eq!(detail.to[0].email, "me@example.com");
        assert_eq!(detail.cc[0].email, "bob@corp.io");
        assert!(detail.bcc.is_empty());
        assert_eq!(detail.summary.labels, vec!["INBOX".to_string(), "Work".to_string()]);
        assert_eq!(detail.attachments.len(), 1);
        assert_eq!(detail.attachments[0].filename, "report.pdf");
        assert!(detail.received_at.is_some());
    }

    #[tokio::test]
    async fn test_body_recovered_from_raw() {
        let engine = sqlite_engine().await;
        let detail = engine.get_message_by_source_id("g2").await.unwrap().unwrap();
        assert_eq!(detail.body_text.trim(), "Thanks, looks good.");
        assert_eq!(detail.to[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_recovered_subject_fills_empty_subject() {
        let engine = sqlite_engine().await;
        sqlx::raw_sql(
            "INSERT INTO message_raw VALUES (
                6,
                CAST('Subject: =?utf-8?Q?Caf=C3=A9_tonight?=' || char(10) || char(10) || 'see you' AS BLOB),
                NULL
            );
            INSERT INTO message_raw VALUES (3, CAST('garbage' AS BLOB), 'lz4');",
        )
        .execute(engine.pool())
        .await
        .unwrap();

        let detail = engine.get_message(6).await.unwrap().unwrap();
        assert_eq!(detail.summary.subject, "Café tonight");
        assert_eq!(detail.body_text, "see you");

        // Undecodable raw MIME leaves the body empty instead of failing.
        let detail = engine.get_message(3).await.unwrap().unwrap();
        assert_eq!(detail.summary.subject, "50% discount");
        assert_eq!(detail.body_text, "");
    }

    #[tokio::test]
    async fn test_inline_sender_in_detail() {
        let engine = sqlite_engine().await;
        let detail = engine.get_message(6).await.unwrap().unwrap();
        assert_eq!(detail.from.len(), 1);
        assert_eq!(detail.from[0].name, "Eve");
    }

    #[tokio::test]
    async fn test_missing_entities_are_none() {
        let engine = sqlite_engine().await;
        assert!(engine.get_message(999).await.unwrap().is_none());
        assert!(engine.get_message_by_source_id("nope").await.unwrap().is_none());
        assert!(engine.get_attachment(999).await.unwrap().is_none());
        assert_eq!(
            engine.get_attachment(2).await.unwrap().unwrap().mime_type,
            "image/png"
        );
    }

    #[tokio::test]
    async fn test_gmail_ids_exclude_deleted() {
        let engine = sqlite_engine().await;
        let ids = engine
            .get_gmail_ids_by_filter(&MessageFilter::new())
            .await
            .unwrap();
        assert_eq!(ids, vec!["g1", "g2", "g3", "g5", "w1"]);

        let mut filter = MessageFilter::new().with_exact(ViewType::Domains, "example.com");
        filter.pagination.limit = 1;
        let ids = engine.get_gmail_ids_by_filter(&filter).await.unwrap();
        assert_eq!(ids, vec!["g1"]);
    }

    #[tokio::test]
    async fn test_total_stats() {
        let engine = sqlite_engine().await;
        let stats = engine
            .get_total_stats(&StatsOptions::default())
            .await
            .unwrap();
        assert_eq!(
            stats,
            TotalStats {
                message_count: 6,
                total_size: 10_600,
                attachment_count: 3,
                attachment_size: 800,
                label_count: 3,
                account_count: 2,
            }
        );

        let scoped = engine
            .get_total_stats(&StatsOptions {
                source_id: Some(2),
                ..StatsOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(scoped.message_count, 1);
        assert_eq!(scoped.label_count, 0);
        assert_eq!(scoped.account_count, 1);
    }

    #[tokio::test]
    async fn test_list_accounts() {
        let engine = sqlite_engine().await;
        let accounts = engine.list_accounts().await.unwrap();
        let identifiers: Vec<&str> = accounts.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["+15550000", "me@example.com"]);
    }

    #[tokio::test]
    async fn test_query_error_names_stage() {
        let engine = sqlite_engine().await;
        sqlx::query("DROP TABLE message_labels")
            .execute(engine.pool())
            .await
            .unwrap();
        let err = engine
            .aggregate(ViewType::Labels, &AggregateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query { stage: "aggregate query", .. }));
    }
}
