//! Statement builders for engine operations.
//!
//! Every statement that touches `m` starts with [`Source::with_clause`], so
//! predicates may reference `snd`, `snd_info` and `att` freely.

use super::{Conditions, Dialect, Source, SqlArg, Statement, Table, ViewDef};
use crate::filter::as_i64;
use crate::{AggregateOptions, MessageSortField, MessageSorting, SortField};

/// Number of leading columns decoded as a message summary.
pub(crate) const SUMMARY_COLUMNS: usize = 16;

/// Summary projection aliases, in decode order.
const SUMMARY_ALIASES: [&str; SUMMARY_COLUMNS] = [
    "id",
    "source_message_id",
    "conversation_id",
    "source_conversation_id",
    "conversation_title",
    "subject",
    "snippet",
    "from_email",
    "from_name",
    "from_phone",
    "sent_at",
    "size_estimate",
    "has_attachments",
    "attachment_count",
    "deleted_at",
    "message_type",
];

fn summary_exprs(dialect: Dialect) -> [String; SUMMARY_COLUMNS] {
    [
        "m.id".to_string(),
        "COALESCE(m.source_message_id, '')".to_string(),
        "m.conversation_id".to_string(),
        "COALESCE(c.source_conversation_id, '')".to_string(),
        "COALESCE(c.title, '')".to_string(),
        "COALESCE(m.subject, '')".to_string(),
        "COALESCE(m.snippet, '')".to_string(),
        "COALESCE(si.email_address, '')".to_string(),
        "COALESCE(si.display_name, '')".to_string(),
        "si.phone_number".to_string(),
        dialect.ts_text("m.sent_at"),
        dialect.int("m.size_estimate"),
        dialect.flag("m.has_attachments"),
        dialect.int("a.attachment_count"),
        dialect.ts_text("m.deleted_from_source_at"),
        "COALESCE(m.message_type, 'email')".to_string(),
    ]
}

/// Summary projection with stable aliases.
fn summary_select(dialect: Dialect) -> String {
    summary_exprs(dialect)
        .iter()
        .zip(SUMMARY_ALIASES)
        .map(|(expr, alias)| format!("{expr} AS {alias}"))
        .collect::<Vec<_>>()
        .join(",\n       ")
}

/// Message rows joined with everything a summary shows.
fn summary_from(src: &Source) -> String {
    format!(
        "{} m\nLEFT JOIN {} c ON c.id = m.conversation_id\n\
LEFT JOIN snd_info si ON si.message_id = m.id\n\
LEFT JOIN att a ON a.message_id = m.id",
        src.table(Table::Messages),
        src.table(Table::Conversations)
    )
}

/// `ORDER BY` body for a message list.
pub(crate) fn list_order(sorting: MessageSorting) -> String {
    let dir = sorting.direction.sql();
    let column = match sorting.field {
        MessageSortField::Date => "m.sent_at",
        MessageSortField::Size => "m.size_estimate",
        MessageSortField::Subject => "m.subject",
    };
    format!("{column} {dir} NULLS LAST, m.id {dir}")
}

/// Newest first, the order of every search result.
pub(crate) const SEARCH_ORDER: &str = "m.sent_at DESC NULLS LAST, m.id DESC";

/// One page of message summaries.
pub(crate) fn summaries(
    src: &Source,
    conds: &Conditions,
    order: &str,
    limit: usize,
    offset: usize,
) -> Statement {
    let sql = format!(
        "{}SELECT {}\nFROM {}\nWHERE {}\nORDER BY {order}\nLIMIT ? OFFSET ?",
        src.with_clause(),
        summary_select(src.dialect()),
        summary_from(src),
        conds.to_where()
    );
    let mut args = conds.args.clone();
    args.push(SqlArg::Int(as_i64(limit)));
    args.push(SqlArg::Int(as_i64(offset)));
    Statement::new(sql, args)
}

/// Number of matching messages.
pub(crate) fn count(src: &Source, conds: &Conditions) -> Statement {
    let sql = format!(
        "{}SELECT COUNT(*) FROM {} m WHERE {}",
        src.with_clause(),
        src.table(Table::Messages),
        conds.to_where()
    );
    Statement::new(sql, conds.args.clone())
}

/// `(message_id, label name)` pairs for a batch of messages, sorted.
pub(crate) fn labels_for(src: &Source, ids: &[i64]) -> Statement {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "{}SELECT ml.message_id, l.name\nFROM {} ml\nJOIN {} l ON l.id = ml.label_id\n\
WHERE ml.message_id IN ({placeholders})\nORDER BY ml.message_id, l.name",
        base_with(src),
        src.table(Table::MessageLabels),
        src.table(Table::Labels)
    );
    Statement::new(sql, ids.iter().copied().map(SqlArg::Int).collect())
}

/// Grouped rows of one aggregate view.
///
/// Ties on the sort field are broken by key ascending so results are
/// deterministic; `total_unique` counts every group before the limit.
pub(crate) fn aggregate(
    src: &Source,
    def: &ViewDef,
    conds: &Conditions,
    opts: &AggregateOptions,
) -> Statement {
    let dialect = src.dialect();
    let order_column = match opts.sort_field {
        SortField::Count => "message_count",
        SortField::Size => "total_size",
        SortField::AttachmentSize => "attachment_size",
        SortField::Name => "group_key",
    };
    let dir = opts.sort_direction.sql();
    let order = if opts.sort_field == SortField::Name {
        format!("group_key {dir}")
    } else {
        format!("{order_column} {dir}, group_key ASC")
    };

    let sql = format!(
        "{with}SELECT group_key, message_count, total_size, attachment_size, attachment_count, total_unique
FROM (
    SELECT {key} AS group_key,
           COUNT(*) AS message_count,
           {size} AS total_size,
           {att_size} AS attachment_size,
           {att_count} AS attachment_count,
           COUNT(*) OVER () AS total_unique
    FROM {messages} m
    {joins}
    LEFT JOIN att a ON a.message_id = m.id
    WHERE {where_clause} AND {guard}
    GROUP BY {key}
) grouped
ORDER BY {order}
LIMIT ?",
        with = src.with_clause(),
        key = def.key,
        size = dialect.int("SUM(m.size_estimate)"),
        att_size = dialect.int("SUM(a.attachment_size)"),
        att_count = dialect.int("SUM(a.attachment_count)"),
        messages = src.table(Table::Messages),
        joins = def.joins,
        where_clause = conds.to_where(),
        guard = def.guard,
    );
    let mut args = conds.args.clone();
    args.push(SqlArg::Int(as_i64(opts.effective_limit())));
    Statement::new(sql, args)
}

/// Message count, size, attachment count and size, and distinct accounts.
pub(crate) fn message_stats(src: &Source, conds: &Conditions) -> Statement {
    let dialect = src.dialect();
    let sql = format!(
        "{}SELECT COUNT(*), {}, {}, {}, COUNT(DISTINCT m.source_id)\n\
FROM {} m\nLEFT JOIN att a ON a.message_id = m.id\nWHERE {}",
        src.with_clause(),
        dialect.int("SUM(m.size_estimate)"),
        dialect.int("SUM(a.attachment_count)"),
        dialect.int("SUM(a.attachment_size)"),
        src.table(Table::Messages),
        conds.to_where()
    );
    Statement::new(sql, conds.args.clone())
}

/// Labels defined in the store, optionally for one account.
pub(crate) fn label_count(src: &Source, source_id: Option<i64>) -> Statement {
    let table = src.table(Table::Labels);
    match source_id {
        Some(id) => Statement::new(
            format!("SELECT COUNT(*) FROM {table} WHERE source_id = ?"),
            vec![SqlArg::Int(id)],
        ),
        None => Statement::new(format!("SELECT COUNT(*) FROM {table}"), Vec::new()),
    }
}

/// Configured accounts, optionally just one.
pub(crate) fn account_count(src: &Source, source_id: Option<i64>) -> Statement {
    let table = src.table(Table::Sources);
    match source_id {
        Some(id) => Statement::new(
            format!("SELECT COUNT(*) FROM {table} WHERE id = ?"),
            vec![SqlArg::Int(id)],
        ),
        None => Statement::new(format!("SELECT COUNT(*) FROM {table}"), Vec::new()),
    }
}

/// Distinct label names attached to the matching messages.
pub(crate) fn matched_label_count(src: &Source, conds: &Conditions) -> Statement {
    let sql = format!(
        "{}SELECT COUNT(DISTINCT l.name)\nFROM {} x\nJOIN {} l ON l.id = x.label_id\n\
WHERE x.message_id IN (SELECT m.id FROM {} m WHERE {})",
        src.with_clause(),
        src.table(Table::MessageLabels),
        src.table(Table::Labels),
        src.table(Table::Messages),
        conds.to_where()
    );
    Statement::new(sql, conds.args.clone())
}

/// Source message ids of live messages matching the filter.
pub(crate) fn gmail_ids(src: &Source, conds: &Conditions, limit: usize) -> Statement {
    let mut sql = format!(
        "{}SELECT DISTINCT m.source_message_id\nFROM {} m\n\
WHERE m.deleted_from_source_at IS NULL AND m.source_message_id IS NOT NULL AND {}\n\
ORDER BY m.source_message_id",
        src.with_clause(),
        src.table(Table::Messages),
        conds.to_where()
    );
    let mut args = conds.args.clone();
    if limit > 0 {
        sql.push_str("\nLIMIT ?");
        args.push(SqlArg::Int(as_i64(limit)));
    }
    Statement::new(sql, args)
}

/// How a single message is looked up.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MessageKey<'a> {
    Id(i64),
    SourceId(&'a str),
}

/// Summary columns plus `received_at` for one message.
pub(crate) fn message_row(src: &Source, key: MessageKey<'_>) -> Statement {
    let (predicate, arg) = match key {
        MessageKey::Id(id) => ("m.id = ?", SqlArg::Int(id)),
        MessageKey::SourceId(id) => ("m.source_message_id = ?", SqlArg::from(id)),
    };
    let sql = format!(
        "{}SELECT {},\n       {} AS received_at\nFROM {}\nWHERE {predicate}\nLIMIT 1",
        src.with_clause(),
        summary_select(src.dialect()),
        src.dialect().ts_text("m.received_at"),
        summary_from(src)
    );
    Statement::new(sql, vec![arg])
}

pub(crate) fn message_body(src: &Source, id: i64) -> Statement {
    Statement::new(
        format!(
            "SELECT COALESCE(body_text, ''), COALESCE(body_html, '') FROM {} WHERE message_id = ?",
            src.table(Table::Bodies)
        ),
        vec![SqlArg::Int(id)],
    )
}

pub(crate) fn message_raw(src: &Source, id: i64) -> Statement {
    Statement::new(
        format!(
            "SELECT raw_data, compression FROM {} WHERE message_id = ?",
            src.table(Table::Raw)
        ),
        vec![SqlArg::Int(id)],
    )
}

/// `(role, email, name)` rows; senders include the inline sender reference.
pub(crate) fn participants(src: &Source, id: i64) -> Statement {
    let participants = src.table(Table::Participants);
    let sql = format!(
        "{with}SELECT 'from' AS role,
       COALESCE(p.email_address, '') AS email,
       COALESCE(NULLIF(TRIM(s.display_name), ''), p.display_name, '') AS name,
       s.via AS ord,
       s.participant_id AS pid
FROM snd s
JOIN {participants} p ON p.id = s.participant_id
WHERE s.message_id = ?
UNION ALL
SELECT r.recipient_type,
       COALESCE(p.email_address, ''),
       COALESCE(NULLIF(TRIM(r.display_name), ''), p.display_name, ''),
       0,
       r.participant_id
FROM {recipients} r
JOIN {participants} p ON p.id = r.participant_id
WHERE r.message_id = ? AND r.recipient_type IN ('to', 'cc', 'bcc')
ORDER BY 1, 4, 5",
        with = src.with_clause(),
        recipients = src.table(Table::Recipients),
    );
    Statement::new(sql, vec![SqlArg::Int(id), SqlArg::Int(id)])
}

const ATTACHMENT_COLUMNS: &str = "id, COALESCE(filename, ''), COALESCE(mime_type, ''), \
CAST(COALESCE(size, 0) AS BIGINT), COALESCE(content_hash, '')";

pub(crate) fn attachments_of(src: &Source, message_id: i64) -> Statement {
    Statement::new(
        format!(
            "SELECT {} FROM {} WHERE message_id = ? ORDER BY id",
            attachment_columns(src.dialect()),
            src.table(Table::Attachments)
        ),
        vec![SqlArg::Int(message_id)],
    )
}

pub(crate) fn attachment(src: &Source, id: i64) -> Statement {
    Statement::new(
        format!(
            "SELECT {} FROM {} WHERE id = ?",
            attachment_columns(src.dialect()),
            src.table(Table::Attachments)
        ),
        vec![SqlArg::Int(id)],
    )
}

fn attachment_columns(dialect: Dialect) -> String {
    match dialect {
        Dialect::DuckDb => ATTACHMENT_COLUMNS.to_string(),
        Dialect::Sqlite => ATTACHMENT_COLUMNS.replace("AS BIGINT", "AS INTEGER"),
    }
}

pub(crate) fn accounts(src: &Source) -> Statement {
    Statement::new(
        format!(
            "{}SELECT id, COALESCE(source_type, ''), COALESCE(identifier, ''), \
COALESCE(display_name, '')\nFROM {} ORDER BY identifier, id",
            base_with(src),
            src.table(Table::Sources)
        ),
        Vec::new(),
    )
}

/// Base CTEs only, for statements that never touch the derived relations.
fn base_with(src: &Source) -> String {
    match src {
        Source::Parquet(ctes) => format!("WITH {ctes}\n"),
        Source::Sqlite | Source::Scanner => String::new(),
    }
}

/// Materializes the summaries of all matches, plus the columns stats need,
/// into `table`.
pub(crate) fn materialize_matches(src: &Source, table: &str, conds: &Conditions) -> Statement {
    let dialect = src.dialect();
    let sql = format!(
        "CREATE TEMP TABLE {table} AS\n{}SELECT {},\n       {} AS attachment_size,\n       \
m.source_id AS source_id,\n       m.sent_at AS sort_at\nFROM {}\nWHERE {}",
        src.with_clause(),
        summary_select(dialect),
        dialect.int("a.attachment_size"),
        summary_from(src),
        conds.to_where()
    );
    Statement::new(sql, conds.args.clone())
}

pub(crate) fn count_matches(table: &str) -> Statement {
    Statement::new(format!("SELECT COUNT(*) FROM {table}"), Vec::new())
}

/// One page of the materialized matches, newest first.
pub(crate) fn page_of_matches(table: &str, limit: usize, offset: usize) -> Statement {
    let sql = format!(
        "SELECT {}\nFROM {table}\nORDER BY sort_at DESC NULLS LAST, id DESC\nLIMIT ? OFFSET ?",
        SUMMARY_ALIASES.join(", ")
    );
    Statement::new(sql, vec![SqlArg::Int(as_i64(limit)), SqlArg::Int(as_i64(offset))])
}

/// Same columns as [`message_stats`], over the materialized matches.
pub(crate) fn stats_of_matches(table: &str) -> Statement {
    let sql = format!(
        "SELECT COUNT(*),\n       CAST(COALESCE(SUM(size_estimate), 0) AS BIGINT),\n       \
CAST(COALESCE(SUM(attachment_count), 0) AS BIGINT),\n       \
CAST(COALESCE(SUM(attachment_size), 0) AS BIGINT),\n       COUNT(DISTINCT source_id)\nFROM {table}"
    );
    Statement::new(sql, Vec::new())
}

pub(crate) fn label_count_of_matches(src: &Source, table: &str) -> Statement {
    let sql = format!(
        "{}SELECT COUNT(DISTINCT l.name)\nFROM {} x\nJOIN {} l ON l.id = x.label_id\n\
WHERE x.message_id IN (SELECT id FROM {table})",
        base_with(src),
        src.table(Table::MessageLabels),
        src.table(Table::Labels)
    );
    Statement::new(sql, Vec::new())
}

pub(crate) fn drop_table(table: &str) -> Statement {
    Statement::new(format!("DROP TABLE IF EXISTS {table}"), Vec::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sql::view_def;
    use crate::{SortDirection, TimeGranularity, ViewType};

    #[test]
    fn test_summary_projection_is_aligned() {
        let select = summary_select(Dialect::Sqlite);
        assert_eq!(select.matches(" AS ").count(), SUMMARY_COLUMNS + 4);
        assert!(select.starts_with("m.id AS id"));
        assert!(select.ends_with("COALESCE(m.message_type, 'email') AS message_type"));
    }

    #[test]
    fn test_aggregate_tie_break() {
        let def = view_def(&Source::Sqlite, ViewType::Senders, TimeGranularity::Month);
        let opts = AggregateOptions {
            sort_field: SortField::Size,
            limit: 10,
            ..AggregateOptions::default()
        };
        let stmt = aggregate(&Source::Sqlite, &def, &Conditions::default(), &opts);
        assert!(stmt.sql.contains("ORDER BY total_size DESC, group_key ASC"));
        assert!(stmt.sql.contains("COUNT(*) OVER () AS total_unique"));
        assert!(stmt.sql.contains("WHERE 1=1 AND v_p.email_address IS NOT NULL"));
        assert_eq!(stmt.args, vec![SqlArg::Int(10)]);

        let opts = AggregateOptions {
            sort_field: SortField::Name,
            sort_direction: SortDirection::Asc,
            ..AggregateOptions::default()
        };
        let stmt = aggregate(&Source::Sqlite, &def, &Conditions::default(), &opts);
        assert!(stmt.sql.contains("ORDER BY group_key ASC\nLIMIT ?"));
        assert_eq!(stmt.args, vec![SqlArg::Int(100)]);
    }

    #[test]
    fn test_list_order() {
        let order = list_order(MessageSorting {
            field: MessageSortField::Size,
            direction: SortDirection::Asc,
        });
        assert_eq!(order, "m.size_estimate ASC NULLS LAST, m.id ASC");
        assert_eq!(
            list_order(MessageSorting::default()),
            "m.sent_at DESC NULLS LAST, m.id DESC"
        );
    }

    #[test]
    fn test_gmail_ids_limit_only_when_positive() {
        let stmt = gmail_ids(&Source::Sqlite, &Conditions::default(), 0);
        assert!(!stmt.sql.contains("LIMIT"));
        assert!(stmt.sql.contains("m.deleted_from_source_at IS NULL"));
        let stmt = gmail_ids(&Source::Scanner, &Conditions::default(), 5);
        assert!(stmt.sql.ends_with("LIMIT ?"));
        assert!(stmt.sql.contains("FROM sqlite_db.messages m"));
        assert_eq!(stmt.args, vec![SqlArg::Int(5)]);
    }

    #[test]
    fn test_labels_for_batch() {
        let stmt = labels_for(&Source::Sqlite, &[3, 1]);
        assert!(stmt.sql.contains("IN (?, ?)"));
        assert!(!stmt.sql.starts_with("WITH"));
        assert_eq!(stmt.args, vec![SqlArg::Int(3), SqlArg::Int(1)]);

        let stmt = labels_for(&Source::Parquet("msg AS (SELECT 1)".into()), &[1]);
        assert!(stmt.sql.starts_with("WITH msg AS (SELECT 1)\n"));
    }

    #[test]
    fn test_materialized_page_reads_only_the_temp_table() {
        let stmt = page_of_matches("_search_matches_1", 50, 100);
        assert!(stmt.sql.contains("FROM _search_matches_1"));
        assert!(!stmt.sql.contains("msg"));
        assert_eq!(stmt.args, vec![SqlArg::Int(50), SqlArg::Int(100)]);
    }
}
