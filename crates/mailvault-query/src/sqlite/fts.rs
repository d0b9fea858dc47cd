//! Full-text index probe.

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{Result, StageExt};

/// Whether the `messages_fts` virtual table exists.
pub(super) async fn probe(pool: &SqlitePool) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'messages_fts'",
    )
    .fetch_one(pool)
    .await
    .stage("probe fts")?;
    debug!(present = count > 0, "FTS probe");
    Ok(count > 0)
}
