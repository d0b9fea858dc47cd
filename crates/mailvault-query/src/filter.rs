//! Request types: grouping dimensions, drill-down filters and options.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::search::SearchQuery;

/// Default aggregate row limit.
pub(crate) const DEFAULT_AGGREGATE_LIMIT: usize = 100;

/// Default page size for message listing.
pub(crate) const DEFAULT_LIST_LIMIT: usize = 500;

/// Grouping dimension of an aggregate view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    /// Sender email address.
    Senders,
    /// Sender display name, falling back to the address.
    SenderNames,
    /// To/cc/bcc email address.
    Recipients,
    /// Recipient display name, falling back to the address.
    RecipientNames,
    /// Sender domain.
    Domains,
    /// Label name.
    Labels,
    /// Time bucket of the sent date.
    Time,
}

impl ViewType {
    /// All views in display order.
    pub const ALL: [Self; 7] = [
        Self::Senders,
        Self::SenderNames,
        Self::Recipients,
        Self::RecipientNames,
        Self::Domains,
        Self::Labels,
        Self::Time,
    ];

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Senders => "Senders",
            Self::SenderNames => "Sender Names",
            Self::Recipients => "Recipients",
            Self::RecipientNames => "Recipient Names",
            Self::Domains => "Domains",
            Self::Labels => "Labels",
            Self::Time => "Time",
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<i64> for ViewType {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| Error::unsupported("view type", code))
    }
}

impl FromStr for ViewType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "senders" => Ok(Self::Senders),
            "sender_names" => Ok(Self::SenderNames),
            "recipients" => Ok(Self::Recipients),
            "recipient_names" => Ok(Self::RecipientNames),
            "domains" => Ok(Self::Domains),
            "labels" => Ok(Self::Labels),
            "time" => Ok(Self::Time),
            _ => Err(Error::unsupported("view type", s)),
        }
    }
}

/// Time bucket size for the Time view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    #[default]
    Month,
    /// `YYYY-MM-DD`
    Day,
}

impl TimeGranularity {
    /// Granularity implied by a period string, or `self` when the length
    /// says nothing.
    ///
    /// `"2024"` is a year, `"2024-05"` a month, `"2024-05-17"` a day.
    #[must_use]
    pub const fn infer(self, period: &str) -> Self {
        match period.len() {
            4 => Self::Year,
            7 => Self::Month,
            10 => Self::Day,
            _ => self,
        }
    }
}

impl TryFrom<i64> for TimeGranularity {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Year),
            1 => Ok(Self::Month),
            2 => Ok(Self::Day),
            _ => Err(Error::unsupported("time granularity", code)),
        }
    }
}

/// Aggregate sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Message count.
    #[default]
    Count,
    /// Total size.
    Size,
    /// Total attachment size.
    AttachmentSize,
    /// Group key.
    Name,
}

impl TryFrom<i64> for SortField {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Count),
            1 => Ok(Self::Size),
            2 => Ok(Self::AttachmentSize),
            3 => Ok(Self::Name),
            _ => Err(Error::unsupported("sort field", code)),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Largest first.
    #[default]
    Desc,
    /// Smallest first.
    Asc,
}

impl SortDirection {
    pub(crate) const fn sql(self) -> &'static str {
        match self {
            Self::Desc => "DESC",
            Self::Asc => "ASC",
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Desc),
            1 => Ok(Self::Asc),
            _ => Err(Error::unsupported("sort direction", code)),
        }
    }
}

/// Message list sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSortField {
    /// Sent date.
    #[default]
    Date,
    /// Size estimate.
    Size,
    /// Subject line.
    Subject,
}

impl TryFrom<i64> for MessageSortField {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Date),
            1 => Ok(Self::Size),
            2 => Ok(Self::Subject),
            _ => Err(Error::unsupported("message sort field", code)),
        }
    }
}

/// How a message list is ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageSorting {
    /// Sort key.
    pub field: MessageSortField,
    /// Direction.
    pub direction: SortDirection,
}

/// Limit and offset. A zero limit means the call's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum rows.
    pub limit: usize,
    /// Rows to skip.
    pub offset: usize,
}

/// Time bucket selector for drill-down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Period such as `"2024"`, `"2024-01"` or `"2024-01-15"`.
    pub period: Option<String>,
    /// Granularity used when the period length does not decide it.
    pub granularity: TimeGranularity,
}

/// Drill-down selector for message listing and sub-aggregation.
///
/// Each dimension has an exact value and an "empty" bucket. The two are
/// mutually exclusive: [`MessageFilter::with_exact`] clears the empty
/// bucket and [`MessageFilter::with_empty`] clears the exact value. When a
/// caller sets both fields directly, the exact value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    /// Sender email address.
    pub sender: Option<String>,
    /// Sender display name (`COALESCE(display_name, email)`).
    pub sender_name: Option<String>,
    /// Recipient email address.
    pub recipient: Option<String>,
    /// Recipient display name (`COALESCE(display_name, email)`).
    pub recipient_name: Option<String>,
    /// Sender domain.
    pub domain: Option<String>,
    /// Label name, matched exactly.
    pub label: Option<String>,
    /// Conversation (thread) id.
    pub conversation_id: Option<i64>,
    /// Account id.
    pub source_id: Option<i64>,
    /// Time bucket.
    pub time_range: TimeRange,
    /// Dimensions that must be empty.
    pub empty_targets: BTreeSet<ViewType>,
    /// Inclusive lower bound on the sent date.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the sent date.
    pub before: Option<DateTime<Utc>>,
    /// Only messages with attachments.
    pub with_attachments_only: bool,
    /// Exclude messages deleted from their source.
    pub hide_deleted: bool,
    /// Page selection.
    pub pagination: Pagination,
    /// Ordering.
    pub sorting: MessageSorting,
}

impl MessageFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact value for a dimension. Empty strings count as unset.
    #[must_use]
    pub fn exact(&self, view: ViewType) -> Option<&str> {
        let value = match view {
            ViewType::Senders => &self.sender,
            ViewType::SenderNames => &self.sender_name,
            ViewType::Recipients => &self.recipient,
            ViewType::RecipientNames => &self.recipient_name,
            ViewType::Domains => &self.domain,
            ViewType::Labels => &self.label,
            ViewType::Time => &self.time_range.period,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Whether the dimension is restricted to its empty bucket.
    #[must_use]
    pub fn matches_empty(&self, view: ViewType) -> bool {
        self.exact(view).is_none() && self.empty_targets.contains(&view)
    }

    /// Whether any empty bucket is active.
    #[must_use]
    pub fn has_empty_targets(&self) -> bool {
        ViewType::ALL.iter().any(|&v| self.matches_empty(v))
    }

    /// Restricts a dimension to one exact value.
    #[must_use]
    pub fn with_exact(mut self, view: ViewType, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match view {
            ViewType::Senders => self.sender = value,
            ViewType::SenderNames => self.sender_name = value,
            ViewType::Recipients => self.recipient = value,
            ViewType::RecipientNames => self.recipient_name = value,
            ViewType::Domains => self.domain = value,
            ViewType::Labels => self.label = value,
            ViewType::Time => self.time_range.period = value,
        }
        self.empty_targets.remove(&view);
        self
    }

    /// Restricts a dimension to messages lacking it.
    #[must_use]
    pub fn with_empty(mut self, view: ViewType) -> Self {
        match view {
            ViewType::Senders => self.sender = None,
            ViewType::SenderNames => self.sender_name = None,
            ViewType::Recipients => self.recipient = None,
            ViewType::RecipientNames => self.recipient_name = None,
            ViewType::Domains => self.domain = None,
            ViewType::Labels => self.label = None,
            ViewType::Time => self.time_range.period = None,
        }
        self.empty_targets.insert(view);
        self
    }

    /// Page limit, or the listing default when unset.
    pub(crate) const fn limit(&self) -> usize {
        if self.pagination.limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            self.pagination.limit
        }
    }
}

/// Options for an aggregate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    /// Account id.
    pub source_id: Option<i64>,
    /// Inclusive lower bound on the sent date.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the sent date.
    pub before: Option<DateTime<Utc>>,
    /// Sort key.
    pub sort_field: SortField,
    /// Sort direction.
    pub sort_direction: SortDirection,
    /// Maximum groups; zero means 100.
    pub limit: usize,
    /// Bucket size for the Time view.
    pub granularity: TimeGranularity,
    /// Only messages with attachments.
    pub with_attachments_only: bool,
    /// Exclude messages deleted from their source.
    pub hide_deleted: bool,
    /// Restricts the groups to messages matching a parsed search.
    pub search_query: Option<SearchQuery>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            source_id: None,
            after: None,
            before: None,
            sort_field: SortField::Count,
            sort_direction: SortDirection::Desc,
            limit: DEFAULT_AGGREGATE_LIMIT,
            granularity: TimeGranularity::Month,
            with_attachments_only: false,
            hide_deleted: false,
            search_query: None,
        }
    }
}

impl AggregateOptions {
    pub(crate) const fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_AGGREGATE_LIMIT
        } else {
            self.limit
        }
    }
}

/// Options for archive statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsOptions {
    /// Account id.
    pub source_id: Option<i64>,
    /// Only messages with attachments.
    pub with_attachments_only: bool,
    /// Exclude messages deleted from their source.
    pub hide_deleted: bool,
    /// Restricts the statistics to messages matching a parsed search.
    pub search_query: Option<SearchQuery>,
    /// View whose key columns free-text terms match instead of subject and
    /// sender, so totals agree with the visible aggregate rows.
    pub group_by: Option<ViewType>,
}

/// Saturating conversion for LIMIT/OFFSET binds.
pub(crate) fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
