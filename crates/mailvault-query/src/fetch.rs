//! Operations expressed once over any statement runner.
//!
//! Each backend implements [`Fetch`] for a [`Source`]; the functions here
//! build statements for that source, run them and assemble the results.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mailvault_mime::{Compression, MessageBody};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filter::DEFAULT_AGGREGATE_LIMIT;
use crate::model::{
    AccountInfo, AggregateRow, AttachmentInfo, MessageDetail, MessageSummary, TotalStats,
};
use crate::row::{self, Cell, Decode, RowReader};
use crate::search::{SearchQuery, parse_timestamp};
use crate::sql::{self, Conditions, MessageKey, Source, Statement};
use crate::{AggregateOptions, MessageFilter, StatsOptions, ViewType};

/// Runs statements against one source.
pub(crate) trait Fetch {
    /// Where this runner's statements read from.
    fn source(&self) -> &Source;

    /// Runs `stmt` and decodes every row.
    async fn fetch<T: Send + 'static>(
        &self,
        stage: &'static str,
        stmt: &Statement,
        decode: Decode<T>,
    ) -> Result<Vec<T>>;

    /// First row, if any.
    async fn fetch_one<T: Send + 'static>(
        &self,
        stage: &'static str,
        stmt: &Statement,
        decode: Decode<T>,
    ) -> Result<Option<T>> {
        Ok(self.fetch(stage, stmt, decode).await?.into_iter().next())
    }

    /// Single integer result, zero when there is no row.
    async fn scalar(&self, stage: &'static str, stmt: &Statement) -> Result<i64> {
        Ok(self
            .fetch_one(stage, stmt, row::single_int)
            .await?
            .unwrap_or(0))
    }
}

pub(crate) async fn aggregate<F: Fetch>(
    f: &F,
    view: ViewType,
    opts: &AggregateOptions,
    filter: Option<&MessageFilter>,
) -> Result<Vec<AggregateRow>> {
    let src = f.source();
    let def = sql::view_def(src, view, opts.granularity);
    let mut conds = sql::aggregate_conditions(src, opts);
    if let Some(filter) = filter {
        conds.append(sql::filter_conditions(src, filter));
    }
    if let Some(q) = opts.search_query.as_ref().filter(|q| !q.is_empty()) {
        conds.append(sql::aggregate_search(src, q, &def.key_columns));
    }
    debug!(
        view = %view,
        sub = filter.is_some(),
        empty_buckets = filter.is_some_and(MessageFilter::has_empty_targets),
        conditions = conds.clauses.len(),
        "aggregate"
    );
    let stmt = sql::aggregate(src, &def, &conds, opts);
    f.fetch("aggregate query", &stmt, row::aggregate).await
}

pub(crate) async fn list_messages<F: Fetch>(
    f: &F,
    filter: &MessageFilter,
) -> Result<Vec<MessageSummary>> {
    let src = f.source();
    let conds = sql::filter_conditions(src, filter);
    debug!(
        empty_buckets = filter.has_empty_targets(),
        conditions = conds.clauses.len(),
        "list messages"
    );
    let order = sql::list_order(filter.sorting);
    let stmt = sql::summaries(src, &conds, &order, filter.limit(), filter.pagination.offset);
    let mut messages = f.fetch("list messages", &stmt, row::summary).await?;
    attach_labels(f, &mut messages).await?;
    Ok(messages)
}

/// Drill-down filter plus metadata search terms.
pub(crate) fn fast_conditions(src: &Source, q: &SearchQuery, filter: &MessageFilter) -> Conditions {
    let mut conds = sql::filter_conditions(src, filter);
    conds.append(sql::fast_search(src, q));
    conds
}

/// Search page size; zero means 100.
pub(crate) const fn search_limit(limit: usize) -> usize {
    if limit == 0 { DEFAULT_AGGREGATE_LIMIT } else { limit }
}

pub(crate) async fn search_fast<F: Fetch>(
    f: &F,
    q: &SearchQuery,
    filter: &MessageFilter,
    limit: usize,
    offset: usize,
) -> Result<Vec<MessageSummary>> {
    let src = f.source();
    let conds = fast_conditions(src, q, filter);
    let stmt = sql::summaries(src, &conds, sql::SEARCH_ORDER, search_limit(limit), offset);
    let mut messages = f.fetch("search fast", &stmt, row::summary).await?;
    attach_labels(f, &mut messages).await?;
    Ok(messages)
}

pub(crate) async fn search_fast_count<F: Fetch>(
    f: &F,
    q: &SearchQuery,
    filter: &MessageFilter,
) -> Result<i64> {
    let src = f.source();
    let conds = fast_conditions(src, q, filter);
    f.scalar("search fast count", &sql::count(src, &conds)).await
}

/// Full search; `fts` routes free text through the FTS index.
pub(crate) async fn search<F: Fetch>(
    f: &F,
    q: &SearchQuery,
    limit: usize,
    offset: usize,
    fts: bool,
) -> Result<Vec<MessageSummary>> {
    let src = f.source();
    let conds = sql::full_search(src, q, fts);
    let stmt = sql::summaries(src, &conds, sql::SEARCH_ORDER, search_limit(limit), offset);
    let mut messages = f.fetch("search", &stmt, row::summary).await?;
    attach_labels(f, &mut messages).await?;
    Ok(messages)
}

/// Fills `labels` of each summary with one batched lookup.
pub(crate) async fn attach_labels<F: Fetch>(f: &F, messages: &mut [MessageSummary]) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    let stmt = sql::labels_for(f.source(), &ids);
    let links = f.fetch("fetch labels", &stmt, row::label_link).await?;

    let mut by_message: HashMap<i64, Vec<String>> = HashMap::new();
    for (id, name) in links {
        by_message.entry(id).or_default().push(name);
    }
    for message in messages {
        if let Some(labels) = by_message.remove(&message.id) {
            message.labels = labels;
        }
    }
    Ok(())
}

/// Scope and search predicates for statistics.
pub(crate) fn stats_conditions(src: &Source, opts: &StatsOptions) -> Conditions {
    let scope = AggregateOptions {
        source_id: opts.source_id,
        with_attachments_only: opts.with_attachments_only,
        hide_deleted: opts.hide_deleted,
        ..AggregateOptions::default()
    };
    let mut conds = sql::aggregate_conditions(src, &scope);
    if let Some(q) = opts.search_query.as_ref().filter(|q| !q.is_empty()) {
        conds.append(sql::stats_search(src, q, opts.group_by));
    }
    conds
}

/// Statistics against the relational store, where labels and accounts
/// are counted from their own tables.
pub(crate) async fn relational_stats<F: Fetch>(f: &F, opts: &StatsOptions) -> Result<TotalStats> {
    let src = f.source();
    let conds = stats_conditions(src, opts);
    let (mut stats, _) = f
        .fetch_one("message stats", &sql::message_stats(src, &conds), row::message_stats)
        .await?
        .unwrap_or_default();
    stats.label_count = f
        .scalar("label count", &sql::label_count(src, opts.source_id))
        .await?;
    stats.account_count = f
        .scalar("account count", &sql::account_count(src, opts.source_id))
        .await?;
    Ok(stats)
}

pub(crate) async fn accounts<F: Fetch>(f: &F) -> Result<Vec<AccountInfo>> {
    f.fetch("list accounts", &sql::accounts(f.source()), row::account)
        .await
}

/// Source message ids for deletion staging.
pub(crate) async fn gmail_ids<F: Fetch>(f: &F, filter: &MessageFilter) -> Result<Vec<String>> {
    let src = f.source();
    let conds = sql::filter_conditions(src, filter);
    let stmt = sql::gmail_ids(src, &conds, filter.pagination.limit);
    f.fetch("gmail ids", &stmt, row::single_text).await
}

pub(crate) async fn attachment<F: Fetch>(f: &F, id: i64) -> Result<Option<AttachmentInfo>> {
    f.fetch_one("get attachment", &sql::attachment(f.source(), id), row::attachment)
        .await
}

fn detail_row(row: &dyn RowReader) -> Cell<(MessageSummary, Option<DateTime<Utc>>)> {
    let summary = row::summary(row)?;
    let received_at = row
        .opt_text(sql::SUMMARY_COLUMNS)?
        .as_deref()
        .and_then(parse_timestamp);
    Ok((summary, received_at))
}

/// A full message, or `None` when no message has the key.
pub(crate) async fn message_detail<F: Fetch>(
    f: &F,
    key: MessageKey<'_>,
) -> Result<Option<MessageDetail>> {
    let src = f.source();
    if !src.has_bodies() {
        return Err(Error::Config(
            "message detail needs the relational store".to_string(),
        ));
    }
    let Some((mut summary, received_at)) = f
        .fetch_one("get message", &sql::message_row(src, key), detail_row)
        .await?
    else {
        return Ok(None);
    };
    let id = summary.id;

    let (mut body_text, body_html) = f
        .fetch_one("get message body", &sql::message_body(src, id), row::body)
        .await?
        .unwrap_or_default();
    if body_text.is_empty()
        && body_html.is_empty()
        && let Some(mut recovered) = recover_body(f, id).await
    {
        if summary.subject.is_empty()
            && let Some(subject) = recovered.subject.take()
        {
            summary.subject = subject;
        }
        body_text = recovered.into_text();
    }

    let mut detail = MessageDetail {
        received_at,
        body_text,
        body_html,
        ..MessageDetail::default()
    };
    let participants = f
        .fetch("fetch participants", &sql::participants(src, id), row::participant)
        .await?;
    for (role, address) in participants {
        match role.as_str() {
            "from" => detail.from.push(address),
            "to" => detail.to.push(address),
            "cc" => detail.cc.push(address),
            "bcc" => detail.bcc.push(address),
            _ => {}
        }
    }

    attach_labels(f, std::slice::from_mut(&mut summary)).await?;
    detail.summary = summary;
    detail.attachments = f
        .fetch("fetch attachments", &sql::attachments_of(src, id), row::attachment)
        .await?;
    Ok(Some(detail))
}

/// Body recovered from raw MIME; `None` when the message has none.
///
/// Lookup and decoding failures are logged and also yield `None`.
async fn recover_body<F: Fetch>(f: &F, id: i64) -> Option<MessageBody> {
    let recovered = match f
        .fetch_one("get raw message", &sql::message_raw(f.source(), id), row::raw)
        .await
    {
        Ok(Some((data, compression))) => decode_raw(&data, compression.as_deref()),
        Ok(None) => return None,
        Err(e) => Err(e),
    };
    recovered
        .inspect_err(|e| warn!(message_id = id, error = %e, "body recovery from raw MIME failed"))
        .ok()
}

/// Parses a stored raw message given its compression tag.
fn decode_raw(data: &[u8], compression: Option<&str>) -> Result<MessageBody> {
    let compression = Compression::parse(compression)?;
    Ok(MessageBody::from_stored(data, compression)?)
}
