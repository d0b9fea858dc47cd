//! Positional row decoding shared by both backends.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::QuerySource;
use crate::model::{
    AccountInfo, Address, AggregateRow, AttachmentInfo, MessageSummary, TotalStats,
};
use crate::search::parse_timestamp;

/// Result of reading one column.
pub(crate) type Cell<T> = std::result::Result<T, QuerySource>;

/// Turns a result row into a value.
pub(crate) type Decode<T> = fn(&dyn RowReader) -> Cell<T>;

/// Column access by position, NULL as `None`.
pub(crate) trait RowReader {
    fn opt_int(&self, idx: usize) -> Cell<Option<i64>>;
    fn opt_text(&self, idx: usize) -> Cell<Option<String>>;
    fn opt_blob(&self, idx: usize) -> Cell<Option<Vec<u8>>>;

    fn int(&self, idx: usize) -> Cell<i64> {
        Ok(self.opt_int(idx)?.unwrap_or(0))
    }

    fn text(&self, idx: usize) -> Cell<String> {
        Ok(self.opt_text(idx)?.unwrap_or_default())
    }

    fn flag(&self, idx: usize) -> Cell<bool> {
        Ok(self.int(idx)? != 0)
    }
}

impl RowReader for SqliteRow {
    fn opt_int(&self, idx: usize) -> Cell<Option<i64>> {
        Ok(self.try_get(idx)?)
    }

    fn opt_text(&self, idx: usize) -> Cell<Option<String>> {
        Ok(self.try_get(idx)?)
    }

    fn opt_blob(&self, idx: usize) -> Cell<Option<Vec<u8>>> {
        Ok(self.try_get(idx)?)
    }
}

impl RowReader for duckdb::Row<'_> {
    fn opt_int(&self, idx: usize) -> Cell<Option<i64>> {
        Ok(self.get(idx)?)
    }

    fn opt_text(&self, idx: usize) -> Cell<Option<String>> {
        Ok(self.get(idx)?)
    }

    fn opt_blob(&self, idx: usize) -> Cell<Option<Vec<u8>>> {
        Ok(self.get(idx)?)
    }
}

/// Summary columns in the order `sql::summaries` selects them.
pub(crate) fn summary(row: &dyn RowReader) -> Cell<MessageSummary> {
    let message_type = row.text(15)?;
    Ok(MessageSummary {
        id: row.int(0)?,
        source_message_id: row.text(1)?,
        conversation_id: row.opt_int(2)?,
        source_conversation_id: row.text(3)?,
        conversation_title: row.text(4)?,
        subject: row.text(5)?,
        snippet: row.text(6)?,
        from_email: row.text(7)?,
        from_name: row.text(8)?,
        from_phone: row.opt_text(9)?.filter(|p| !p.is_empty()),
        sent_at: row.opt_text(10)?.as_deref().and_then(parse_timestamp),
        size_estimate: row.int(11)?,
        has_attachments: row.flag(12)?,
        attachment_count: row.int(13)?,
        labels: Vec::new(),
        deleted_at: row.opt_text(14)?.as_deref().and_then(parse_timestamp),
        message_type: message_type.parse().unwrap_or_default(),
    })
}

pub(crate) fn aggregate(row: &dyn RowReader) -> Cell<AggregateRow> {
    Ok(AggregateRow {
        key: row.text(0)?,
        count: row.int(1)?,
        total_size: row.int(2)?,
        attachment_size: row.int(3)?,
        attachment_count: row.int(4)?,
        total_unique: row.int(5)?,
    })
}

/// Message-side statistics; label and account counts are filled in later.
pub(crate) fn message_stats(row: &dyn RowReader) -> Cell<(TotalStats, i64)> {
    let stats = TotalStats {
        message_count: row.int(0)?,
        total_size: row.int(1)?,
        attachment_count: row.int(2)?,
        attachment_size: row.int(3)?,
        label_count: 0,
        account_count: 0,
    };
    Ok((stats, row.int(4)?))
}

pub(crate) fn single_int(row: &dyn RowReader) -> Cell<i64> {
    row.int(0)
}

pub(crate) fn single_text(row: &dyn RowReader) -> Cell<String> {
    row.text(0)
}

pub(crate) fn label_link(row: &dyn RowReader) -> Cell<(i64, String)> {
    Ok((row.int(0)?, row.text(1)?))
}

pub(crate) fn body(row: &dyn RowReader) -> Cell<(String, String)> {
    Ok((row.text(0)?, row.text(1)?))
}

pub(crate) fn raw(row: &dyn RowReader) -> Cell<(Vec<u8>, Option<String>)> {
    Ok((row.opt_blob(0)?.unwrap_or_default(), row.opt_text(1)?))
}

pub(crate) fn participant(row: &dyn RowReader) -> Cell<(String, Address)> {
    Ok((
        row.text(0)?,
        Address {
            email: row.text(1)?,
            name: row.text(2)?,
        },
    ))
}

pub(crate) fn attachment(row: &dyn RowReader) -> Cell<AttachmentInfo> {
    Ok(AttachmentInfo {
        id: row.int(0)?,
        filename: row.text(1)?,
        mime_type: row.text(2)?,
        size: row.int(3)?,
        content_hash: row.text(4)?,
    })
}

pub(crate) fn account(row: &dyn RowReader) -> Cell<AccountInfo> {
    Ok(AccountInfo {
        id: row.int(0)?,
        source_type: row.text(1)?,
        identifier: row.text(2)?,
        display_name: row.text(3)?,
    })
}
