//! Archive fixture shared by engine tests.
//!
//! The same schema and rows load into an in-memory SQLite pool and into
//! DuckDB, which writes them out as a Parquet cache. Both engines therefore
//! see one archive:
//!
//! | id | account | sender          | subject              | sent                | labels          |
//! |----|---------|-----------------|----------------------|---------------------|-----------------|
//! | 1  | 1       | alice (from)    | Quarterly report     | 2024-01-15 10:00:00 | INBOX, Work     |
//! | 2  | 1       | bob (from)      | Re: Quarterly report | 2024-01-16 09:00:00 | Work            |
//! | 3  | 1       | dave (from)     | 50% discount         | 2024-02-01 12:00:00 |                 |
//! | 4  | 1       | carol (from)    | 500 discount         | 2023-12-31 23:00:00 | INBOX (deleted) |
//! | 5  | 1       | none            | No sender            | NULL                | Personal        |
//! | 6  | 2       | eve (sender_id) | NULL                 | 2024-02-10 08:00:00 |                 |

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::SqliteEngine;

pub(crate) const SCHEMA: &str = r"
CREATE TABLE sources (
    id INTEGER PRIMARY KEY,
    source_type TEXT NOT NULL,
    identifier TEXT NOT NULL,
    display_name TEXT
);
CREATE TABLE conversations (
    id INTEGER PRIMARY KEY,
    source_id INTEGER,
    source_conversation_id TEXT,
    title TEXT
);
CREATE TABLE participants (
    id INTEGER PRIMARY KEY,
    email_address TEXT,
    display_name TEXT,
    domain TEXT,
    phone_number TEXT
);
CREATE TABLE messages (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL,
    source_message_id TEXT,
    conversation_id INTEGER,
    subject TEXT,
    snippet TEXT,
    sent_at DATETIME,
    received_at DATETIME,
    size_estimate INTEGER,
    has_attachments BOOLEAN,
    deleted_from_source_at DATETIME,
    sender_id INTEGER,
    message_type TEXT
);
CREATE TABLE message_recipients (
    message_id INTEGER,
    participant_id INTEGER,
    recipient_type TEXT,
    display_name TEXT
);
CREATE TABLE labels (
    id INTEGER PRIMARY KEY,
    source_id INTEGER,
    name TEXT
);
CREATE TABLE message_labels (
    message_id INTEGER,
    label_id INTEGER
);
CREATE TABLE attachments (
    id INTEGER PRIMARY KEY,
    message_id INTEGER,
    filename TEXT,
    mime_type TEXT,
    size INTEGER,
    content_hash TEXT
);
";

pub(crate) const DATA: &str = r"
INSERT INTO sources VALUES
    (1, 'gmail', 'me@example.com', 'Me'),
    (2, 'whatsapp', '+15550000', 'Phone');
INSERT INTO conversations VALUES
    (1, 1, 't-report', NULL),
    (2, 1, 't-sale', NULL),
    (3, 1, 't-old', NULL),
    (4, 2, 'chat-family', 'Family');
INSERT INTO participants VALUES
    (1, 'alice@example.com', 'Alice Smith', 'example.com', NULL),
    (2, 'bob@corp.io', 'Bob', 'corp.io', NULL),
    (3, 'carol@example.com', '', 'example.com', NULL),
    (4, 'me@example.com', 'Me', 'example.com', NULL),
    (5, 'dave@other.org', NULL, 'other.org', NULL),
    (6, '', 'Eve', '', '+15551234');
INSERT INTO messages VALUES
    (1, 1, 'g1', 1, 'Quarterly report', 'numbers attached', '2024-01-15 10:00:00', '2024-01-15 10:00:05', 1000, TRUE, NULL, NULL, 'email'),
    (2, 1, 'g2', 1, 'Re: Quarterly report', 'thanks', '2024-01-16 09:00:00', NULL, 2000, FALSE, NULL, NULL, 'email'),
    (3, 1, 'g3', 2, '50% discount', 'sale', '2024-02-01 12:00:00', NULL, 3000, TRUE, NULL, NULL, 'email'),
    (4, 1, 'g4', 3, '500 discount', 'another sale', '2023-12-31 23:00:00', NULL, 4000, FALSE, '2024-03-01 00:00:00', NULL, 'email'),
    (5, 1, 'g5', NULL, 'No sender', '', NULL, NULL, 500, FALSE, NULL, NULL, 'email'),
    (6, 2, 'w1', 4, NULL, 'hi there', '2024-02-10 08:00:00', NULL, 100, FALSE, NULL, 6, 'chat');
INSERT INTO message_recipients VALUES
    (1, 1, 'from', NULL),
    (1, 4, 'to', NULL),
    (1, 2, 'cc', NULL),
    (2, 2, 'from', NULL),
    (2, 1, 'to', 'Alice'),
    (3, 5, 'from', NULL),
    (3, 4, 'to', NULL),
    (4, 3, 'from', NULL),
    (4, 4, 'to', NULL),
    (4, 2, 'bcc', NULL),
    (5, 4, 'to', NULL);
INSERT INTO labels VALUES
    (1, 1, 'INBOX'),
    (2, 1, 'Work'),
    (3, 1, 'Personal');
INSERT INTO message_labels VALUES
    (1, 1), (1, 2), (2, 2), (4, 1), (5, 3);
INSERT INTO attachments VALUES
    (1, 1, 'report.pdf', 'application/pdf', 500, 'h1'),
    (2, 3, 'a.png', 'image/png', 100, 'h2'),
    (3, 3, 'b.png', 'image/png', 200, 'h3');
";

/// Bodies exist only in the relational store. Message 2 has no body row,
/// only raw MIME.
const BODIES: &str = r"
CREATE TABLE message_bodies (
    message_id INTEGER PRIMARY KEY,
    body_text TEXT,
    body_html TEXT
);
CREATE TABLE message_raw (
    message_id INTEGER PRIMARY KEY,
    raw_data BLOB,
    compression TEXT
);
INSERT INTO message_bodies VALUES (1, 'Q1 numbers are in.', '<p>Q1 numbers are in.</p>');
INSERT INTO message_raw VALUES (
    2,
    CAST('Subject: Re: Quarterly report' || char(13, 10) ||
         'Content-Type: text/plain; charset=utf-8' || char(13, 10) || char(13, 10) ||
         'Thanks, looks good.' AS BLOB),
    NULL
);
";

/// Fifteen senders with one message each, loaded on [`SCHEMA`] alone.
/// For `i` in 1..=7, `bulk{i}` and `bulk{i + 8}` both send `1000 + 100 * i`
/// bytes, so size ties break on the address; `bulk8` sends 1000.
pub(crate) const BULK_SENDERS: &str = r"
INSERT INTO sources VALUES (1, 'gmail', 'bulk@example.com', 'Bulk');
INSERT INTO participants VALUES
    (101, 'bulk1@bulk.test', 'Bulk 1', 'bulk.test', NULL),
    (102, 'bulk2@bulk.test', 'Bulk 2', 'bulk.test', NULL),
    (103, 'bulk3@bulk.test', 'Bulk 3', 'bulk.test', NULL),
    (104, 'bulk4@bulk.test', 'Bulk 4', 'bulk.test', NULL),
    (105, 'bulk5@bulk.test', 'Bulk 5', 'bulk.test', NULL),
    (106, 'bulk6@bulk.test', 'Bulk 6', 'bulk.test', NULL),
    (107, 'bulk7@bulk.test', 'Bulk 7', 'bulk.test', NULL),
    (108, 'bulk8@bulk.test', 'Bulk 8', 'bulk.test', NULL),
    (109, 'bulk9@bulk.test', 'Bulk 9', 'bulk.test', NULL),
    (110, 'bulk10@bulk.test', 'Bulk 10', 'bulk.test', NULL),
    (111, 'bulk11@bulk.test', 'Bulk 11', 'bulk.test', NULL),
    (112, 'bulk12@bulk.test', 'Bulk 12', 'bulk.test', NULL),
    (113, 'bulk13@bulk.test', 'Bulk 13', 'bulk.test', NULL),
    (114, 'bulk14@bulk.test', 'Bulk 14', 'bulk.test', NULL),
    (115, 'bulk15@bulk.test', 'Bulk 15', 'bulk.test', NULL);
INSERT INTO messages VALUES
    (101, 1, 'b1', NULL, 'Bulk 1', '', '2024-03-01 00:00:00', NULL, 1100, FALSE, NULL, NULL, 'email'),
    (102, 1, 'b2', NULL, 'Bulk 2', '', '2024-03-01 00:00:00', NULL, 1200, FALSE, NULL, NULL, 'email'),
    (103, 1, 'b3', NULL, 'Bulk 3', '', '2024-03-01 00:00:00', NULL, 1300, FALSE, NULL, NULL, 'email'),
    (104, 1, 'b4', NULL, 'Bulk 4', '', '2024-03-01 00:00:00', NULL, 1400, FALSE, NULL, NULL, 'email'),
    (105, 1, 'b5', NULL, 'Bulk 5', '', '2024-03-01 00:00:00', NULL, 1500, FALSE, NULL, NULL, 'email'),
    (106, 1, 'b6', NULL, 'Bulk 6', '', '2024-03-01 00:00:00', NULL, 1600, FALSE, NULL, NULL, 'email'),
    (107, 1, 'b7', NULL, 'Bulk 7', '', '2024-03-01 00:00:00', NULL, 1700, FALSE, NULL, NULL, 'email'),
    (108, 1, 'b8', NULL, 'Bulk 8', '', '2024-03-01 00:00:00', NULL, 1000, FALSE, NULL, NULL, 'email'),
    (109, 1, 'b9', NULL, 'Bulk 9', '', '2024-03-01 00:00:00', NULL, 1100, FALSE, NULL, NULL, 'email'),
    (110, 1, 'b10', NULL, 'Bulk 10', '', '2024-03-01 00:00:00', NULL, 1200, FALSE, NULL, NULL, 'email'),
    (111, 1, 'b11', NULL, 'Bulk 11', '', '2024-03-01 00:00:00', NULL, 1300, FALSE, NULL, NULL, 'email'),
    (112, 1, 'b12', NULL, 'Bulk 12', '', '2024-03-01 00:00:00', NULL, 1400, FALSE, NULL, NULL, 'email'),
    (113, 1, 'b13', NULL, 'Bulk 13', '', '2024-03-01 00:00:00', NULL, 1500, FALSE, NULL, NULL, 'email'),
    (114, 1, 'b14', NULL, 'Bulk 14', '', '2024-03-01 00:00:00', NULL, 1600, FALSE, NULL, NULL, 'email'),
    (115, 1, 'b15', NULL, 'Bulk 15', '', '2024-03-01 00:00:00', NULL, 1700, FALSE, NULL, NULL, 'email');
INSERT INTO message_recipients VALUES
    (101, 101, 'from', NULL), (102, 102, 'from', NULL), (103, 103, 'from', NULL), (104, 104, 'from', NULL), (105, 105, 'from', NULL),
    (106, 106, 'from', NULL), (107, 107, 'from', NULL), (108, 108, 'from', NULL), (109, 109, 'from', NULL), (110, 110, 'from', NULL),
    (111, 111, 'from', NULL), (112, 112, 'from', NULL), (113, 113, 'from', NULL), (114, 114, 'from', NULL), (115, 115, 'from', NULL);
";

/// In-memory relational store with the fixture loaded.
pub(crate) async fn sqlite_pool() -> SqlitePool {
    sqlite_pool_with(&[SCHEMA, DATA, BODIES]).await
}

/// In-memory relational store loaded from `scripts`.
pub(crate) async fn sqlite_pool_with(scripts: &[&str]) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for script in scripts {
        sqlx::raw_sql(script).execute(&pool).await.unwrap();
    }
    pool
}

pub(crate) async fn sqlite_engine() -> SqliteEngine {
    SqliteEngine::from_pool(sqlite_pool().await)
}

/// Writes the fixture, bodies included, to a SQLite file at `path`.
pub(crate) async fn write_sqlite_file(path: &Path) {
    let url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap();
    for script in [SCHEMA, DATA, BODIES] {
        sqlx::raw_sql(script).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

/// Writes the fixture as a Parquet cache under `dir`.
pub(crate) fn write_parquet(dir: &Path) {
    write_parquet_with(dir, &[]);
}

/// Like [`write_parquet`], with `(table, select)` pairs replacing the
/// rows written for a table, e.g. to drop columns.
pub(crate) fn write_parquet_with(dir: &Path, overrides: &[(&str, &str)]) {
    write_parquet_from(dir, &[SCHEMA, DATA], overrides);
}

/// Writes the rows `scripts` load as a Parquet cache under `dir`.
pub(crate) fn write_parquet_from(dir: &Path, scripts: &[&str], overrides: &[(&str, &str)]) {
    let conn = duckdb::Connection::open_in_memory().unwrap();
    for script in scripts {
        conn.execute_batch(script).unwrap();
    }

    let quote = |p: &Path| p.display().to_string().replace('\'', "''");
    let select = |table: &str, default: String| {
        overrides
            .iter()
            .find(|(t, _)| *t == table)
            .map_or(default, |(_, s)| (*s).to_string())
    };

    let messages = select(
        "messages",
        "SELECT *, year(sent_at) AS year FROM messages".to_string(),
    );
    conn.execute_batch(&format!(
        "COPY ({messages}) TO '{}' (FORMAT PARQUET, PARTITION_BY (year))",
        quote(&dir.join("messages"))
    ))
    .unwrap();

    for table in [
        "sources",
        "participants",
        "message_recipients",
        "labels",
        "message_labels",
        "attachments",
        "conversations",
    ] {
        let table_dir = dir.join(table);
        std::fs::create_dir_all(&table_dir).unwrap();
        let rows = select(table, format!("SELECT * FROM {table}"));
        conn.execute_batch(&format!(
            "COPY ({rows}) TO '{}' (FORMAT PARQUET)",
            quote(&table_dir.join("data.parquet"))
        ))
        .unwrap();
    }
}
