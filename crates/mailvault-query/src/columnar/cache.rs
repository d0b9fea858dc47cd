//! Materialized search results.
//!
//! A search scans the Parquet cache once into a temp table. Further pages,
//! the count and the statistics for the same predicate read that table.
//! A different predicate replaces it; at most one exists at a time.
//!
//! The entry is recorded before its table is created and only marked ready
//! once the scan finishes, so a search abandoned mid-scan leaves an entry
//! the next search drops instead of reusing.

use tracing::{debug, warn};

use super::session::Session;
use crate::error::Result;
use crate::model::{MessageSummary, TotalStats};
use crate::row;
use crate::sql::{self, Conditions, Source};

/// A temp table and the key it was built for.
#[derive(Debug)]
struct Entry {
    table: String,
    key: String,
    ready: bool,
}

/// Cache state: empty, or one materialization with its key.
#[derive(Debug, Default)]
pub(crate) struct SearchCache {
    entry: Option<Entry>,
    count: i64,
    stats: Option<TotalStats>,
    /// Sequence for temp table names.
    seq: u64,
    materializations: u64,
}

impl SearchCache {
    /// Makes the cache hold the matches of `conds`, scanning only when the
    /// key differs from the current entry. Returns the temp table name.
    pub async fn ensure(
        &mut self,
        session: &Session,
        parquet: &Source,
        conds: &Conditions,
    ) -> Result<String> {
        let key = conds.cache_key()?;
        if let Some(entry) = &self.entry
            && entry.ready
            && entry.key == key
        {
            let table = entry.table.clone();
            debug!(table = %table, "search cache hit");
            if self.stats.is_none() {
                self.stats = compute_stats(session, parquet, &table).await;
            }
            return Ok(table);
        }

        self.clear(session).await;
        self.seq += 1;
        let table = format!("_search_matches_{}", self.seq);
        debug!(table = %table, "search cache miss, materializing");
        self.entry = Some(Entry {
            table: table.clone(),
            key,
            ready: false,
        });
        self.count = -1;

        if let Err(e) = session
            .execute(
                "materialize search matches",
                &sql::materialize_matches(parquet, &table, conds),
            )
            .await
        {
            self.clear(session).await;
            return Err(e);
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.ready = true;
        }
        self.materializations += 1;

        self.count = match session
            .query("count search matches", &sql::count_matches(&table), row::single_int)
            .await
        {
            Ok(rows) => rows.into_iter().next().unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "search count failed");
                -1
            }
        };
        self.stats = compute_stats(session, parquet, &table).await;
        Ok(table)
    }

    /// One page of the current materialization, labels not yet attached.
    pub async fn page(
        &self,
        session: &Session,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageSummary>> {
        session
            .query(
                "search page",
                &sql::page_of_matches(table, limit, offset),
                row::summary,
            )
            .await
    }

    pub const fn count(&self) -> i64 {
        self.count
    }

    pub const fn stats(&self) -> Option<TotalStats> {
        self.stats
    }

    pub const fn materializations(&self) -> u64 {
        self.materializations
    }

    /// Drops the materialization, if any. The drop completes even if the
    /// caller goes away; failures are logged.
    pub async fn clear(&mut self, session: &Session) {
        self.count = 0;
        self.stats = None;
        if let Some(Entry { table, .. }) = self.entry.take() {
            drop_quietly(session, &table).await;
        }
    }
}

async fn drop_quietly(session: &Session, table: &str) {
    if let Err(e) = session
        .execute_detached("drop search matches", &sql::drop_table(table))
        .await
    {
        warn!(table, error = %e, "failed to drop search cache table");
    }
}

/// Statistics over the materialized matches; `None` when they cannot be
/// computed. The label count alone degrades to zero.
async fn compute_stats(session: &Session, parquet: &Source, table: &str) -> Option<TotalStats> {
    let (mut stats, accounts) = match session
        .query("search stats", &sql::stats_of_matches(table), row::message_stats)
        .await
    {
        Ok(rows) => rows.into_iter().next().unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "search stats failed");
            return None;
        }
    };
    stats.account_count = accounts;
    stats.label_count = match session
        .query(
            "search label count",
            &sql::label_count_of_matches(parquet, table),
            row::single_int,
        )
        .await
    {
        Ok(rows) => rows.into_iter().next().unwrap_or(0),
        Err(e) => {
            warn!(error = %e, "search label count failed");
            0
        }
    };
    Some(stats)
}
