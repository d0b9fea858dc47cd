//! Parquet cache layout and the schema probe.
//!
//! Each cached table becomes a CTE with an explicit, typed projection.
//! Columns added after a cache was built are optional: when a file lacks
//! one, the CTE supplies a typed default so newer queries still run.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use super::session::Session;
use crate::error::{Error, Result};
use crate::row;
use crate::sql::Statement;

/// A column of a cached table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColumnSpec {
    name: &'static str,
    ty: &'static str,
    /// Literal used when the column is missing; `None` means required.
    default: Option<&'static str>,
}

const fn req(name: &'static str, ty: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        default: None,
    }
}

const fn opt(name: &'static str, ty: &'static str, default: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        default: Some(default),
    }
}

impl ColumnSpec {
    fn read(self) -> String {
        let ColumnSpec { name, ty, .. } = self;
        if ty == "BOOLEAN" {
            format!("COALESCE(TRY_CAST({name} AS BOOLEAN), false) AS {name}")
        } else {
            format!("CAST({name} AS {ty}) AS {name}")
        }
    }
}

/// A cached table: its directory, CTE name and columns.
#[derive(Debug)]
pub(crate) struct TableSpec {
    pub dir: &'static str,
    cte: &'static str,
    partitioned: bool,
    columns: &'static [ColumnSpec],
}

pub(crate) const TABLES: [TableSpec; 8] = [
    TableSpec {
        dir: "messages",
        cte: "msg",
        partitioned: true,
        columns: &[
            req("id", "BIGINT"),
            req("source_id", "BIGINT"),
            req("source_message_id", "VARCHAR"),
            opt("conversation_id", "BIGINT", "NULL"),
            req("subject", "VARCHAR"),
            opt("snippet", "VARCHAR", "''"),
            req("sent_at", "TIMESTAMP"),
            opt("received_at", "TIMESTAMP", "NULL"),
            req("size_estimate", "BIGINT"),
            req("has_attachments", "BOOLEAN"),
            opt("deleted_from_source_at", "TIMESTAMP", "NULL"),
            opt("sender_id", "BIGINT", "NULL"),
            opt("message_type", "VARCHAR", "'email'"),
        ],
    },
    TableSpec {
        dir: "participants",
        cte: "p",
        partitioned: false,
        columns: &[
            req("id", "BIGINT"),
            req("email_address", "VARCHAR"),
            req("display_name", "VARCHAR"),
            req("domain", "VARCHAR"),
            opt("phone_number", "VARCHAR", "NULL"),
        ],
    },
    TableSpec {
        dir: "message_recipients",
        cte: "mr",
        partitioned: false,
        columns: &[
            req("message_id", "BIGINT"),
            req("participant_id", "BIGINT"),
            req("recipient_type", "VARCHAR"),
            opt("display_name", "VARCHAR", "NULL"),
        ],
    },
    TableSpec {
        dir: "labels",
        cte: "lbl",
        partitioned: false,
        columns: &[
            req("id", "BIGINT"),
            req("name", "VARCHAR"),
            opt("source_id", "BIGINT", "NULL"),
        ],
    },
    TableSpec {
        dir: "message_labels",
        cte: "ml",
        partitioned: false,
        columns: &[req("message_id", "BIGINT"), req("label_id", "BIGINT")],
    },
    TableSpec {
        dir: "attachments",
        cte: "att_raw",
        partitioned: false,
        columns: &[
            req("message_id", "BIGINT"),
            req("size", "BIGINT"),
            opt("id", "BIGINT", "NULL"),
            opt("filename", "VARCHAR", "NULL"),
            opt("mime_type", "VARCHAR", "NULL"),
            opt("content_hash", "VARCHAR", "NULL"),
        ],
    },
    TableSpec {
        dir: "conversations",
        cte: "conv",
        partitioned: false,
        columns: &[
            req("id", "BIGINT"),
            req("source_conversation_id", "VARCHAR"),
            opt("title", "VARCHAR", "NULL"),
        ],
    },
    TableSpec {
        dir: "sources",
        cte: "src",
        partitioned: false,
        columns: &[
            req("id", "BIGINT"),
            req("identifier", "VARCHAR"),
            opt("source_type", "VARCHAR", "NULL"),
            opt("display_name", "VARCHAR", "NULL"),
        ],
    },
];

impl TableSpec {
    /// `read_parquet(...)` call for this table under `dir`.
    fn reader(&self, dir: &Path) -> String {
        let path = dir.join(self.dir);
        let glob = if self.partitioned {
            path.join("**").join("*.parquet")
        } else {
            path.join("*.parquet")
        };
        let glob = glob.display().to_string().replace('\'', "''");
        if self.partitioned {
            format!("read_parquet('{glob}', hive_partitioning = true, union_by_name = true)")
        } else {
            format!("read_parquet('{glob}', union_by_name = true)")
        }
    }

    /// Typed projection over the columns present, and the optional columns
    /// that had to be defaulted.
    fn projection(&self, present: &HashSet<String>) -> Result<(String, Vec<&'static str>)> {
        let mut exprs = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for &column in self.columns {
            if present.contains(column.name) {
                exprs.push(column.read());
                continue;
            }
            let Some(default) = column.default else {
                return Err(Error::Config(format!(
                    "analytics table {} lacks required column {}; rebuild the cache",
                    self.dir, column.name
                )));
            };
            exprs.push(format!("CAST({default} AS {}) AS {}", column.ty, column.name));
            missing.push(column.name);
        }
        Ok((exprs.join(", "), missing))
    }
}

/// Probes every cached table under `dir` and returns the base CTE
/// definitions (without the leading `WITH`).
pub(crate) async fn probe(session: &Session, dir: &Path) -> Result<String> {
    let mut ctes = Vec::with_capacity(TABLES.len());
    for table in &TABLES {
        let reader = table.reader(dir);
        let describe = Statement::new(format!("DESCRIBE SELECT * FROM {reader}"), Vec::new());
        let present: HashSet<String> = session
            .query("probe cache schema", &describe, row::single_text)
            .await?
            .into_iter()
            .collect();

        let (projection, missing) = table.projection(&present)?;
        if !missing.is_empty() {
            warn!(
                table = table.dir,
                columns = ?missing,
                "analytics cache predates these columns; defaults are used until the cache is rebuilt"
            );
        }
        ctes.push(format!(
            "{} AS (\n    SELECT {projection}\n    FROM {reader}\n)",
            table.cte
        ));
    }
    Ok(ctes.join(",\n"))
}
