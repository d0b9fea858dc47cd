//! Parsed search queries and the helpers used to bind them.
//!
//! The query text itself is tokenized elsewhere; engines consume the
//! structured [`SearchQuery`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bound representation of every timestamp passed to a backend.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A parsed search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text terms.
    pub text_terms: Vec<String>,
    /// `from:` addresses.
    pub from_addrs: Vec<String>,
    /// `to:` addresses.
    pub to_addrs: Vec<String>,
    /// `cc:` addresses.
    pub cc_addrs: Vec<String>,
    /// `bcc:` addresses.
    pub bcc_addrs: Vec<String>,
    /// `subject:` terms.
    pub subject_terms: Vec<String>,
    /// `label:` names.
    pub labels: Vec<String>,
    /// `has:attachment`
    pub has_attachment: Option<bool>,
    /// `after:` (inclusive).
    pub after: Option<DateTime<Utc>>,
    /// `before:` (exclusive).
    pub before: Option<DateTime<Utc>>,
    /// `larger:` in bytes.
    pub larger_than: Option<i64>,
    /// `smaller:` in bytes.
    pub smaller_than: Option<i64>,
    /// Account scope.
    pub account_id: Option<i64>,
}

impl SearchQuery {
    /// Query with only free-text terms.
    #[must_use]
    pub fn text<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_terms: terms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether the query has no criteria besides the account scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text_terms.is_empty()
            && self.from_addrs.is_empty()
            && self.to_addrs.is_empty()
            && self.cc_addrs.is_empty()
            && self.bcc_addrs.is_empty()
            && self.subject_terms.is_empty()
            && self.labels.is_empty()
            && self.has_attachment.is_none()
            && self.after.is_none()
            && self.before.is_none()
            && self.larger_than.is_none()
            && self.smaller_than.is_none()
    }
}

/// Escapes `LIKE`/`ILIKE` wildcards so the input only matches literally.
///
/// The escape character is `\`, which is escaped first.
#[must_use]
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `%term%` with wildcards in `term` escaped.
#[must_use]
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

/// Formats a timestamp as the fixed `YYYY-MM-DD HH:MM:SS` bind value.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
///
/// Accepts the bind format with optional fractional seconds, a `T`
/// separator, and RFC 3339.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\tmp"), "c:\\\\tmp");
        assert_eq!(escape_like("\\%"), "\\\\\\%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-05-17 09:30:00");
        assert_eq!(parse_timestamp("2024-05-17 09:30:00"), Some(ts));
        assert_eq!(parse_timestamp("2024-05-17 09:30:00.000"), Some(ts));
        assert_eq!(parse_timestamp("2024-05-17T09:30:00Z"), Some(ts));
        assert_eq!(parse_timestamp("2024-05-17T11:30:00+02:00"), Some(ts));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_is_empty_ignores_account() {
        let q = SearchQuery {
            account_id: Some(3),
            ..SearchQuery::default()
        };
        assert!(q.is_empty());
        assert!(!SearchQuery::text(["hello"]).is_empty());
    }

    /// Undoes `escape_like` the way a LIKE matcher reads the pattern.
    fn unescape(p: &str) -> String {
        let mut out = String::new();
        let mut chars = p.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                out.extend(chars.next());
            } else {
                out.push(ch);
            }
        }
        out
    }

    proptest! {
        #[test]
        fn prop_escaped_has_no_bare_wildcards(s in ".{0,40}") {
            let escaped = escape_like(&s);
            let mut chars = escaped.chars();
            while let Some(ch) = chars.next() {
                if ch == '\\' {
                    let next = chars.next();
                    prop_assert!(matches!(next, Some('\\' | '%' | '_')));
                } else {
                    prop_assert!(ch != '%' && ch != '_');
                }
            }
            prop_assert_eq!(unescape(&escaped), s);
        }
    }
}
