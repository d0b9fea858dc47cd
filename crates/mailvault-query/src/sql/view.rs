//! Aggregate view definitions.

use super::{Dialect, Source, Table};
use crate::{TimeGranularity, ViewType};

/// How a dimension reaches its key from a message row `m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Sender participants (`snd`).
    Sender,
    /// To/cc/bcc participants.
    Recipient,
    /// Labels through the link table.
    Label,
    /// The message row itself.
    Time,
}

impl Resolution {
    pub const fn of(view: ViewType) -> Self {
        match view {
            ViewType::Senders | ViewType::SenderNames | ViewType::Domains => Self::Sender,
            ViewType::Recipients | ViewType::RecipientNames => Self::Recipient,
            ViewType::Labels => Self::Label,
            ViewType::Time => Self::Time,
        }
    }

    /// Join path from message `m` to the dimension rows, with aliases
    /// `{prefix}_x` for the link rows and `{prefix}_p` (participants) or
    /// `{prefix}_l` (labels) for the target.
    pub fn path(self, src: &Source, prefix: &str) -> Option<JoinPath> {
        let participants = src.table(Table::Participants);
        let to_participant =
            format!("{participants} {prefix}_p ON {prefix}_p.id = {prefix}_x.participant_id");
        match self {
            Self::Sender => Some(JoinPath {
                rows: format!("snd {prefix}_x"),
                target: to_participant,
                link: format!("{prefix}_x.message_id = m.id"),
            }),
            Self::Recipient => Some(JoinPath {
                rows: format!("{} {prefix}_x", src.table(Table::Recipients)),
                target: to_participant,
                link: format!(
                    "{prefix}_x.message_id = m.id AND {prefix}_x.recipient_type IN ('to', 'cc', 'bcc')"
                ),
            }),
            Self::Label => Some(JoinPath {
                rows: format!("{} {prefix}_x", src.table(Table::MessageLabels)),
                target: format!(
                    "{} {prefix}_l ON {prefix}_l.id = {prefix}_x.label_id",
                    src.table(Table::Labels)
                ),
                link: format!("{prefix}_x.message_id = m.id"),
            }),
            Self::Time => None,
        }
    }
}

/// Link rows, target table and correlation with `m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JoinPath {
    rows: String,
    target: String,
    link: String,
}

impl JoinPath {
    /// `EXISTS (...)` over the path with extra predicates.
    pub fn exists(&self, predicates: &[String]) -> String {
        let mut clause = format!(
            "EXISTS (SELECT 1 FROM {} JOIN {} WHERE {}",
            self.rows, self.target, self.link
        );
        for p in predicates {
            clause.push_str(" AND ");
            clause.push_str(p);
        }
        clause.push(')');
        clause
    }

    /// Inner joins for grouping by the dimension.
    pub fn joins(&self) -> String {
        format!("JOIN {} ON {} JOIN {}", self.rows, self.link, self.target)
    }
}

/// Display name with the address as fallback.
fn name_expr(p: &str) -> String {
    format!("COALESCE(NULLIF(TRIM({p}.display_name), ''), {p}.email_address)")
}

/// Grouping key of `view`, with dimension aliases under `prefix`.
pub(crate) fn key_expr(
    dialect: Dialect,
    view: ViewType,
    granularity: TimeGranularity,
    prefix: &str,
) -> String {
    let p = format!("{prefix}_p");
    match view {
        ViewType::Senders | ViewType::Recipients => format!("{p}.email_address"),
        ViewType::SenderNames | ViewType::RecipientNames => name_expr(&p),
        ViewType::Domains => format!("{p}.domain"),
        ViewType::Labels => format!("{prefix}_l.name"),
        ViewType::Time => dialect.time_bucket(granularity, "m.sent_at"),
    }
}

/// Predicate that holds when `key` is a usable group key.
pub(crate) fn key_present(view: ViewType, key: &str) -> String {
    match view {
        ViewType::Time => "m.sent_at IS NOT NULL".to_string(),
        _ => format!("{key} IS NOT NULL AND {key} != ''"),
    }
}

/// Everything an aggregate needs to group by one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewDef {
    /// Grouping expression.
    pub key: String,
    /// Joins from `m` to the dimension rows.
    pub joins: String,
    /// Excludes rows without a key.
    pub guard: String,
    /// Columns free-text search terms match in 1:N views; empty otherwise.
    pub key_columns: Vec<String>,
}

/// Alias prefix for the view's own joins. Drill-down filters use `f`
/// and search predicates use `q<n>`, so the join graphs never collide.
const VIEW_PREFIX: &str = "v";

pub(crate) fn view_def(src: &Source, view: ViewType, granularity: TimeGranularity) -> ViewDef {
    let dialect = src.dialect();
    let key = key_expr(dialect, view, granularity, VIEW_PREFIX);
    let guard = key_present(view, &key);
    let resolution = Resolution::of(view);

    let joins = resolution
        .path(src, VIEW_PREFIX)
        .map(|path| path.joins())
        .unwrap_or_default();

    let key_columns = match view {
        ViewType::Recipients | ViewType::RecipientNames => vec![
            format!("{VIEW_PREFIX}_p.email_address"),
            format!("{VIEW_PREFIX}_p.display_name"),
        ],
        ViewType::Labels => vec![format!("{VIEW_PREFIX}_l.name")],
        ViewType::Senders | ViewType::SenderNames | ViewType::Domains | ViewType::Time => {
            Vec::new()
        }
    };

    ViewDef {
        key,
        joins,
        guard,
        key_columns,
    }
}
