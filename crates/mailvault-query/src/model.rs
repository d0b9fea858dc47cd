//! Result types returned by the engines.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One group in an aggregate view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Email, name, domain, label or time period.
    pub key: String,
    /// Number of messages in the group.
    pub count: i64,
    /// Sum of message size estimates in bytes.
    pub total_size: i64,
    /// Sum of attachment sizes in bytes.
    pub attachment_size: i64,
    /// Number of attachments.
    pub attachment_count: i64,
    /// Distinct groups in the whole matching set, independent of the limit.
    pub total_unique: i64,
}

/// Kind of stored message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Email message.
    #[default]
    Email,
    /// Chat message from a messaging source.
    Chat,
    /// Any other type tag written by an importer.
    Other(String),
}

impl MessageType {
    /// Storage tag for this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::Chat => "chat",
            Self::Other(tag) => tag,
        }
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "email" => Self::Email,
            "chat" => Self::Chat,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as shown in list views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Relational id.
    pub id: i64,
    /// Id assigned by the source (Gmail message id for Gmail accounts).
    pub source_message_id: String,
    /// Conversation (thread) id.
    pub conversation_id: Option<i64>,
    /// Conversation id assigned by the source.
    pub source_conversation_id: String,
    /// Conversation title, set for group chats.
    pub conversation_title: String,
    /// Subject line.
    pub subject: String,
    /// Short preview of the body.
    pub snippet: String,
    /// Sender email address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: String,
    /// Sender phone number for chat sources.
    pub from_phone: Option<String>,
    /// When the message was sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// Estimated size in bytes.
    pub size_estimate: i64,
    /// Whether the message carries attachments.
    pub has_attachments: bool,
    /// Number of attachments.
    pub attachment_count: i64,
    /// Label names, sorted.
    pub labels: Vec<String>,
    /// When the message was deleted from the source, if it was.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Email or chat.
    pub message_type: MessageType,
}

/// An email address with optional display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address.
    pub email: String,
    /// Display name, empty when unknown.
    pub name: String,
}

/// Attachment metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Attachment id.
    pub id: i64,
    /// File name.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Content hash of the stored blob.
    pub content_hash: String,
}

/// A full message with bodies, participants and attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    /// Summary fields.
    pub summary: MessageSummary,
    /// When the message was received.
    pub received_at: Option<DateTime<Utc>>,
    /// Senders.
    pub from: Vec<Address>,
    /// To recipients.
    pub to: Vec<Address>,
    /// Cc recipients.
    pub cc: Vec<Address>,
    /// Bcc recipients.
    pub bcc: Vec<Address>,
    /// Plain text body.
    pub body_text: String,
    /// HTML body.
    pub body_html: String,
    /// Attachment metadata.
    pub attachments: Vec<AttachmentInfo>,
}

/// A source account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Source id.
    pub id: i64,
    /// Source kind, e.g. "gmail".
    pub source_type: String,
    /// Account identifier (email address for mail sources).
    pub identifier: String,
    /// Display name.
    pub display_name: String,
}

/// Archive-wide statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStats {
    /// Number of messages.
    pub message_count: i64,
    /// Sum of message size estimates.
    pub total_size: i64,
    /// Number of attachments.
    pub attachment_count: i64,
    /// Sum of attachment sizes.
    pub attachment_size: i64,
    /// Number of labels.
    pub label_count: i64,
    /// Number of accounts.
    pub account_count: i64,
}

/// One page of a cached search with its totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFastResult {
    /// Messages on the requested page.
    pub messages: Vec<MessageSummary>,
    /// Total matches, `-1` when the count could not be computed.
    pub total_count: i64,
    /// Statistics over all matches, `None` when they could not be computed.
    pub stats: Option<TotalStats>,
}
