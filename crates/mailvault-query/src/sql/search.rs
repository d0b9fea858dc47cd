//! Search query translation.
//!
//! Match policy depends on the caller. Aggregate and stats search treat
//! every term, labels included, as a case-insensitive substring. The
//! metadata search behind `search_fast` matches addresses as substrings
//! but labels exactly (ignoring case), like a drill-down does. Full
//! search matches addresses and labels as exact sets and runs free text
//! through the FTS index when there is one.

use super::view::Resolution;
use super::{Conditions, Source};
use crate::ViewType;
use crate::search::{SearchQuery, contains_pattern, escape_like, format_timestamp};

/// How `label:` terms compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelMatch {
    Substring,
    Exact,
}

/// Numbered alias prefixes so sibling `EXISTS` clauses never share names.
#[derive(Debug, Default)]
struct Aliases(usize);

impl Aliases {
    fn next(&mut self) -> String {
        self.0 += 1;
        format!("q{}", self.0)
    }
}

/// Free-text terms for aggregate views.
///
/// In 1:N views (`key_columns` non-empty) a term filters the joined
/// dimension rows, so the visible groups are the ones that match. In other
/// views it matches the subject or the sender.
pub(crate) fn aggregate_search(src: &Source, q: &SearchQuery, key_columns: &[String]) -> Conditions {
    let mut aliases = Aliases::default();
    let mut conds = Conditions::default();
    for term in &q.text_terms {
        if key_columns.is_empty() {
            push_subject_or_sender(&mut conds, src, &mut aliases, term);
        } else {
            let parts: Vec<String> = key_columns
                .iter()
                .map(|col| src.dialect().like(col).to_string())
                .collect();
            conds.push(
                format!("({})", parts.join(" OR ")),
                key_columns.iter().map(|_| contains_pattern(term)),
            );
        }
    }
    push_fields(&mut conds, src, &mut aliases, q, LabelMatch::Substring);
    conds
}

/// Search terms for archive statistics grouped by `group_by`.
///
/// The stats query has no dimension joins, so 1:N views test their key
/// columns through `EXISTS`.
pub(crate) fn stats_search(src: &Source, q: &SearchQuery, group_by: Option<ViewType>) -> Conditions {
    let dialect = src.dialect();
    let mut aliases = Aliases::default();
    let mut conds = Conditions::default();

    let resolution = group_by.map(Resolution::of);
    for term in &q.text_terms {
        let prefix = aliases.next();
        match resolution {
            Some(r @ Resolution::Recipient) => {
                if let Some(path) = r.path(src, &prefix) {
                    let p = format!("{prefix}_p");
                    let test = format!(
                        "({} OR {})",
                        dialect.like(&format!("{p}.email_address")),
                        dialect.like(&format!("{p}.display_name"))
                    );
                    conds.push(path.exists(&[test]), [contains_pattern(term), contains_pattern(term)]);
                }
            }
            Some(r @ Resolution::Label) => {
                if let Some(path) = r.path(src, &prefix) {
                    let test = dialect.like(&format!("{prefix}_l.name")).to_string();
                    conds.push(path.exists(&[test]), [contains_pattern(term)]);
                }
            }
            Some(Resolution::Sender | Resolution::Time) | None => {
                push_subject_or_sender(&mut conds, src, &mut aliases, term);
            }
        }
    }
    push_fields(&mut conds, src, &mut aliases, q, LabelMatch::Substring);
    conds
}

/// Metadata-only search: subject and sender, never bodies.
pub(crate) fn fast_search(src: &Source, q: &SearchQuery) -> Conditions {
    let mut aliases = Aliases::default();
    let mut conds = Conditions::default();
    for term in &q.text_terms {
        push_subject_or_sender(&mut conds, src, &mut aliases, term);
    }
    push_fields(&mut conds, src, &mut aliases, q, LabelMatch::Exact);
    conds
}

/// Full search over the relational store.
///
/// `from:` entries starting with `@` match as a domain suffix; every other
/// address, and every label, must equal one of the given values ignoring
/// case. With `fts` set, free text goes through `messages_fts`; otherwise
/// it matches subject or snippet.
pub(crate) fn full_search(src: &Source, q: &SearchQuery, fts: bool) -> Conditions {
    let dialect = src.dialect();
    let mut aliases = Aliases::default();
    let mut conds = Conditions::default();

    if !q.from_addrs.is_empty() {
        let prefix = aliases.next();
        if let Some(path) = Resolution::Sender.path(src, &prefix) {
            let email = format!("LOWER({prefix}_p.email_address)");
            let (domains, exact): (Vec<&String>, Vec<&String>) =
                q.from_addrs.iter().partition(|a| a.starts_with('@'));
            let mut tests = Vec::new();
            let mut args = Vec::new();
            if !exact.is_empty() {
                tests.push(format!("{email} IN ({})", placeholders(exact.len())));
                args.extend(exact.iter().map(|a| a.to_lowercase()));
            }
            for domain in domains {
                tests.push(format!("{email} LIKE ? ESCAPE '\\'"));
                args.push(format!("%{}", escape_like(&domain.to_lowercase())));
            }
            conds.push(path.exists(&[format!("({})", tests.join(" OR "))]), args);
        }
    }

    for (role, addrs) in [("to", &q.to_addrs), ("cc", &q.cc_addrs), ("bcc", &q.bcc_addrs)] {
        if addrs.is_empty() {
            continue;
        }
        let prefix = aliases.next();
        if let Some(path) = Resolution::Recipient.path(src, &prefix) {
            let tests = [
                format!("{prefix}_x.recipient_type = '{role}'"),
                format!("LOWER({prefix}_p.email_address) IN ({})", placeholders(addrs.len())),
            ];
            conds.push(path.exists(&tests), addrs.iter().map(|a| a.to_lowercase()));
        }
    }

    if !q.labels.is_empty() {
        let prefix = aliases.next();
        if let Some(path) = Resolution::Label.path(src, &prefix) {
            let test = format!("LOWER({prefix}_l.name) IN ({})", placeholders(q.labels.len()));
            conds.push(path.exists(&[test]), q.labels.iter().map(|l| l.to_lowercase()));
        }
    }

    for term in &q.subject_terms {
        conds.push(dialect.like("m.subject").to_string(), [contains_pattern(term)]);
    }

    if !q.text_terms.is_empty() {
        if fts {
            conds.push(
                "m.id IN (SELECT rowid FROM messages_fts WHERE messages_fts MATCH ?)",
                [fts_match_expr(&q.text_terms)],
            );
        } else {
            for term in &q.text_terms {
                conds.push(
                    format!(
                        "({} OR {})",
                        dialect.like("m.subject"),
                        dialect.like("m.snippet")
                    ),
                    [contains_pattern(term), contains_pattern(term)],
                );
            }
        }
    }

    push_scalars(&mut conds, src, q);
    conds
}

/// FTS5 match expression: terms ANDed, phrases quoted, quotes doubled.
pub(crate) fn fts_match_expr(terms: &[String]) -> String {
    terms
        .iter()
        .map(|term| {
            let escaped = term.replace('"', "\"\"");
            if escaped.contains(' ') || escaped.contains('"') {
                format!("\"{escaped}\"")
            } else {
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_subject_or_sender(conds: &mut Conditions, src: &Source, aliases: &mut Aliases, term: &str) {
    let dialect = src.dialect();
    let prefix = aliases.next();
    let Some(path) = Resolution::Sender.path(src, &prefix) else {
        return;
    };
    let p = format!("{prefix}_p");
    let sender = path.exists(&[format!(
        "({} OR {})",
        dialect.like(&format!("{p}.email_address")),
        dialect.like(&format!("{p}.display_name"))
    )]);
    let pattern = contains_pattern(term);
    conds.push(
        format!("({} OR {sender})", dialect.like("m.subject")),
        [pattern.clone(), pattern.clone(), pattern],
    );
}

/// Address terms of one role as substring `EXISTS` clauses.
fn push_address(
    conds: &mut Conditions,
    src: &Source,
    aliases: &mut Aliases,
    role: Option<&str>,
    addrs: &[String],
) {
    let dialect = src.dialect();
    for addr in addrs {
        let prefix = aliases.next();
        let resolution = if role.is_some() {
            Resolution::Recipient
        } else {
            Resolution::Sender
        };
        let Some(path) = resolution.path(src, &prefix) else {
            continue;
        };
        let mut tests = vec![dialect.like(&format!("{prefix}_p.email_address")).to_string()];
        if let Some(role) = role {
            tests.push(format!("{prefix}_x.recipient_type = '{role}'"));
        }
        conds.push(path.exists(&tests), [contains_pattern(addr)]);
    }
}

fn push_fields(
    conds: &mut Conditions,
    src: &Source,
    aliases: &mut Aliases,
    q: &SearchQuery,
    labels: LabelMatch,
) {
    let dialect = src.dialect();

    push_address(conds, src, aliases, None, &q.from_addrs);
    // to: covers every recipient role; cc:/bcc: narrow to one.
    for addr in &q.to_addrs {
        let prefix = aliases.next();
        if let Some(path) = Resolution::Recipient.path(src, &prefix) {
            let test = dialect.like(&format!("{prefix}_p.email_address")).to_string();
            conds.push(path.exists(&[test]), [contains_pattern(addr)]);
        }
    }
    push_address(conds, src, aliases, Some("cc"), &q.cc_addrs);
    push_address(conds, src, aliases, Some("bcc"), &q.bcc_addrs);

    for term in &q.subject_terms {
        conds.push(dialect.like("m.subject").to_string(), [contains_pattern(term)]);
    }

    for label in &q.labels {
        let prefix = aliases.next();
        let Some(path) = Resolution::Label.path(src, &prefix) else {
            continue;
        };
        let name = format!("{prefix}_l.name");
        match labels {
            LabelMatch::Substring => {
                conds.push(path.exists(&[dialect.like(&name).to_string()]), [contains_pattern(label)]);
            }
            LabelMatch::Exact => {
                conds.push(path.exists(&[format!("LOWER({name}) = LOWER(?)")]), [label.as_str()]);
            }
        }
    }

    push_scalars(conds, src, q);
}

/// Attachment, date, size and account predicates.
fn push_scalars(conds: &mut Conditions, src: &Source, q: &SearchQuery) {
    let dialect = src.dialect();
    match q.has_attachment {
        Some(true) => conds.push_clause(dialect.truthy("m.has_attachments")),
        Some(false) => conds.push_clause(format!("NOT ({})", dialect.truthy("m.has_attachments"))),
        None => {}
    }
    if let Some(after) = &q.after {
        conds.push(format!("m.sent_at >= {}", dialect.ts_param()), [format_timestamp(after)]);
    }
    if let Some(before) = &q.before {
        conds.push(format!("m.sent_at < {}", dialect.ts_param()), [format_timestamp(before)]);
    }
    if let Some(n) = q.larger_than {
        conds.push("m.size_estimate > ?", [n]);
    }
    if let Some(n) = q.smaller_than {
        conds.push("m.size_estimate < ?", [n]);
    }
    if let Some(id) = q.account_id {
        conds.push("m.source_id = ?", [id]);
    }
}
