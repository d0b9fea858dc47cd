//! Statement construction shared by both engines.
//!
//! Builders return SQL text plus bound arguments. User input only ever
//! travels as an argument; the text is assembled from fixed table names,
//! column names and aliases.

mod conditions;
mod query;
mod search;
mod view;

use serde::Serialize;

pub(crate) use conditions::{aggregate_conditions, filter_conditions};
pub(crate) use query::*;
pub(crate) use search::{aggregate_search, fast_search, full_search, stats_search};
pub(crate) use view::{ViewDef, view_def};

/// A bound argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum SqlArg {
    Int(i64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl duckdb::ToSql for SqlArg {
    fn to_sql(&self) -> duckdb::Result<duckdb::types::ToSqlOutput<'_>> {
        use duckdb::types::{ToSqlOutput, Value};
        Ok(match self {
            Self::Int(v) => ToSqlOutput::Owned(Value::BigInt(*v)),
            Self::Text(v) => ToSqlOutput::Owned(Value::Text(v.clone())),
            Self::Bool(v) => ToSqlOutput::Owned(Value::Boolean(*v)),
        })
    }
}

/// Predicates joined with `AND`, with their arguments in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct Conditions {
    #[serde(rename = "c")]
    pub clauses: Vec<String>,
    #[serde(rename = "a")]
    pub args: Vec<SqlArg>,
}

impl Conditions {
    pub fn push<I>(&mut self, clause: impl Into<String>, args: I)
    where
        I: IntoIterator,
        I::Item: Into<SqlArg>,
    {
        self.clauses.push(clause.into());
        self.args.extend(args.into_iter().map(Into::into));
    }

    pub fn push_clause(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    pub fn append(&mut self, other: Self) {
        self.clauses.extend(other.clauses);
        self.args.extend(other.args);
    }

    /// `WHERE` body; `1=1` when there is nothing to filter.
    pub fn to_where(&self) -> String {
        if self.clauses.is_empty() {
            "1=1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// Deterministic identity of the predicate and its arguments.
    pub fn cache_key(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A statement ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<SqlArg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// SQL flavor of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Sqlite,
    DuckDb,
}

impl Dialect {
    /// Case-insensitive pattern match with `\` as the escape character.
    pub const fn like(self, expr: &str) -> LikeExpr<'_> {
        LikeExpr {
            dialect: self,
            expr,
        }
    }

    /// Placeholder for a timestamp bound in the fixed text format.
    pub const fn ts_param(self) -> &'static str {
        match self {
            Self::Sqlite => "?",
            Self::DuckDb => "CAST(? AS TIMESTAMP)",
        }
    }

    /// Timestamp column rendered as text, or NULL.
    pub fn ts_text(self, expr: &str) -> String {
        match self {
            Self::Sqlite => format!("CAST({expr} AS TEXT)"),
            Self::DuckDb => format!("CAST({expr} AS VARCHAR)"),
        }
    }

    /// Integer column, NULL mapped to zero.
    pub fn int(self, expr: &str) -> String {
        match self {
            Self::Sqlite => format!("CAST(COALESCE({expr}, 0) AS INTEGER)"),
            Self::DuckDb => format!("CAST(COALESCE({expr}, 0) AS BIGINT)"),
        }
    }

    /// Boolean test on a flag column stored as 0/1 or BOOLEAN.
    pub fn truthy(self, expr: &str) -> String {
        match self {
            Self::Sqlite => format!("COALESCE({expr}, 0) = 1"),
            Self::DuckDb => format!("COALESCE(CAST({expr} AS BOOLEAN), false)"),
        }
    }

    /// Flag column as 0/1.
    pub fn flag(self, expr: &str) -> String {
        format!("CASE WHEN {} THEN 1 ELSE 0 END", self.truthy(expr))
    }

    /// Formatted time bucket of a timestamp column.
    pub fn time_bucket(self, granularity: crate::TimeGranularity, expr: &str) -> String {
        use crate::TimeGranularity;
        let fmt = match granularity {
            TimeGranularity::Year => "%Y",
            TimeGranularity::Month => "%Y-%m",
            TimeGranularity::Day => "%Y-%m-%d",
        };
        match self {
            Self::Sqlite => format!("strftime('{fmt}', {expr})"),
            Self::DuckDb => format!("strftime(CAST({expr} AS TIMESTAMP), '{fmt}')"),
        }
    }
}

/// Renders as `expr LIKE ? ESCAPE '\'` (`ILIKE` on DuckDB).
pub(crate) struct LikeExpr<'a> {
    dialect: Dialect,
    expr: &'a str,
}

impl std::fmt::Display for LikeExpr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SQLite LIKE is already case-insensitive for ASCII.
        let op = match self.dialect {
            Dialect::Sqlite => "LIKE",
            Dialect::DuckDb => "ILIKE",
        };
        write!(f, "{} {op} ? ESCAPE '\\'", self.expr)
    }
}

/// Logical tables of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    Messages,
    Recipients,
    Participants,
    Labels,
    MessageLabels,
    Attachments,
    Conversations,
    Sources,
    Bodies,
    Raw,
}

impl Table {
    const fn relational(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Recipients => "message_recipients",
            Self::Participants => "participants",
            Self::Labels => "labels",
            Self::MessageLabels => "message_labels",
            Self::Attachments => "attachments",
            Self::Conversations => "conversations",
            Self::Sources => "sources",
            Self::Bodies => "message_bodies",
            Self::Raw => "message_raw",
        }
    }

    /// CTE name over the analytics cache, where the table is cached.
    const fn cached(self) -> Option<&'static str> {
        match self {
            Self::Messages => Some("msg"),
            Self::Recipients => Some("mr"),
            Self::Participants => Some("p"),
            Self::Labels => Some("lbl"),
            Self::MessageLabels => Some("ml"),
            Self::Attachments => Some("att_raw"),
            Self::Conversations => Some("conv"),
            Self::Sources => Some("src"),
            Self::Bodies | Self::Raw => None,
        }
    }
}

/// Where statements read from.
#[derive(Debug, Clone)]
pub(crate) enum Source {
    /// The relational store through sqlx.
    Sqlite,
    /// The relational store attached to DuckDB as `sqlite_db`.
    Scanner,
    /// The Parquet cache; holds the base CTE definitions.
    Parquet(String),
}

impl Source {
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite => Dialect::Sqlite,
            Self::Scanner | Self::Parquet(_) => Dialect::DuckDb,
        }
    }

    /// Whether body and raw MIME tables are reachable.
    pub const fn has_bodies(&self) -> bool {
        !matches!(self, Self::Parquet(_))
    }

    pub fn table(&self, table: Table) -> String {
        match self {
            Self::Sqlite => table.relational().to_string(),
            Self::Scanner => format!("sqlite_db.{}", table.relational()),
            Self::Parquet(_) => table
                .cached()
                .unwrap_or(table.relational())
                .to_string(),
        }
    }

    /// `WITH` clause defining the derived relations every query may use:
    ///
    /// - `att`: attachment count and size per message.
    /// - `snd`: sender participants per message, from `from` recipient rows
    ///   and from the inline `messages.sender_id` reference.
    /// - `snd_info`: one display sender per message.
    pub fn with_clause(&self) -> String {
        let messages = self.table(Table::Messages);
        let recipients = self.table(Table::Recipients);
        let participants = self.table(Table::Participants);
        let attachments = self.table(Table::Attachments);
        let int = |e: &str| self.dialect().int(e);

        let base = match self {
            Self::Parquet(ctes) => format!("{ctes},\n"),
            Self::Sqlite | Self::Scanner => String::new(),
        };
        let size = int("size");

        format!(
            r"WITH {base}att AS (
    SELECT message_id, COUNT(*) AS attachment_count, SUM({size}) AS attachment_size
    FROM {attachments}
    GROUP BY message_id
),
snd AS (
    SELECT fr.message_id, fr.participant_id, fr.display_name, 0 AS via
    FROM {recipients} fr
    WHERE fr.recipient_type = 'from'
    UNION ALL
    SELECT sm.id AS message_id, sm.sender_id AS participant_id, NULL AS display_name, 1 AS via
    FROM {messages} sm
    WHERE sm.sender_id IS NOT NULL
      AND NOT EXISTS (
          SELECT 1 FROM {recipients} x
          WHERE x.message_id = sm.id
            AND x.recipient_type = 'from'
            AND x.participant_id = sm.sender_id
      )
),
snd_info AS (
    SELECT message_id, email_address, display_name, phone_number
    FROM (
        SELECT s.message_id,
               COALESCE(sp.email_address, '') AS email_address,
               COALESCE(NULLIF(TRIM(s.display_name), ''), sp.display_name, '') AS display_name,
               sp.phone_number,
               ROW_NUMBER() OVER (PARTITION BY s.message_id ORDER BY s.via, s.participant_id) AS rn
        FROM snd s
        JOIN {participants} sp ON sp.id = s.participant_id
    ) ranked
    WHERE rn = 1
)
"
        )
    }
}
