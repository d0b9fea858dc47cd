//! Drill-down filter translation.

use super::view::{Resolution, key_expr, key_present};
use super::{Conditions, Source};
use crate::search::format_timestamp;
use crate::{AggregateOptions, MessageFilter, ViewType};

/// Alias prefix for drill-down semi-joins.
const FILTER_PREFIX: &str = "f";

/// Predicates selecting the messages of a drill-down filter.
///
/// Exact values of dimensions that share a join path are tested against
/// one `EXISTS` so they must hold on the same dimension row: a sender
/// email and a sender domain select one participant, not two. Each empty
/// bucket is a `NOT EXISTS` over rows with a usable key.
pub(crate) fn filter_conditions(src: &Source, filter: &MessageFilter) -> Conditions {
    let dialect = src.dialect();
    let mut conds = Conditions::default();

    if let Some(id) = filter.source_id {
        conds.push("m.source_id = ?", [id]);
    }
    if let Some(id) = filter.conversation_id {
        conds.push("m.conversation_id = ?", [id]);
    }
    push_common(
        &mut conds,
        src,
        filter.after.as_ref(),
        filter.before.as_ref(),
        filter.with_attachments_only,
        filter.hide_deleted,
    );

    for resolution in [Resolution::Sender, Resolution::Recipient, Resolution::Label] {
        let Some(path) = resolution.path(src, FILTER_PREFIX) else {
            continue;
        };
        let views = ViewType::ALL
            .into_iter()
            .filter(|&v| Resolution::of(v) == resolution);

        let mut predicates = Vec::new();
        let mut args = Vec::new();
        for view in views {
            let key = key_expr(dialect, view, filter.time_range.granularity, FILTER_PREFIX);
            if let Some(value) = filter.exact(view) {
                if view == ViewType::Labels {
                    predicates.push(format!("LOWER({key}) = LOWER(?)"));
                } else {
                    predicates.push(format!("{key} = ?"));
                }
                args.push(value.to_string());
            } else if filter.matches_empty(view) {
                conds.push_clause(format!("NOT {}", path.exists(&[key_present(view, &key)])));
            }
        }
        if !predicates.is_empty() {
            conds.push(path.exists(&predicates), args);
        }
    }

    if let Some(period) = filter.exact(ViewType::Time) {
        let granularity = filter.time_range.granularity.infer(period);
        conds.push(
            format!("{} = ?", dialect.time_bucket(granularity, "m.sent_at")),
            [period],
        );
    } else if filter.matches_empty(ViewType::Time) {
        conds.push_clause("m.sent_at IS NULL");
    }

    conds
}

/// Scope predicates of an aggregate request, search excluded.
pub(crate) fn aggregate_conditions(src: &Source, opts: &AggregateOptions) -> Conditions {
    let mut conds = Conditions::default();
    if let Some(id) = opts.source_id {
        conds.push("m.source_id = ?", [id]);
    }
    push_common(
        &mut conds,
        src,
        opts.after.as_ref(),
        opts.before.as_ref(),
        opts.with_attachments_only,
        opts.hide_deleted,
    );
    conds
}

fn push_common(
    conds: &mut Conditions,
    src: &Source,
    after: Option<&chrono::DateTime<chrono::Utc>>,
    before: Option<&chrono::DateTime<chrono::Utc>>,
    with_attachments_only: bool,
    hide_deleted: bool,
) {
    let dialect = src.dialect();
    if let Some(after) = after {
        conds.push(
            format!("m.sent_at >= {}", dialect.ts_param()),
            [format_timestamp(after)],
        );
    }
    if let Some(before) = before {
        conds.push(
            format!("m.sent_at < {}", dialect.ts_param()),
            [format_timestamp(before)],
        );
    }
    if with_attachments_only {
        conds.push_clause(dialect.truthy("m.has_attachments"));
    }
    if hide_deleted {
        conds.push_clause("m.deleted_from_source_at IS NULL");
    }
}
