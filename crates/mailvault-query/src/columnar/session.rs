//! The single DuckDB connection.
//!
//! Session settings (`SET threads`, `ATTACH`) do not carry across
//! connections, so the engine owns exactly one and serializes every
//! statement through its mutex. Statements run on the blocking pool. A
//! call whose future is dropped before its statement starts is skipped;
//! one dropped while its statement runs interrupts it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use duckdb::{Connection, InterruptHandle};
use tracing::{debug, warn};

use crate::error::{Error, Result, StageExt};
use crate::fetch::Fetch;
use crate::row::Decode;
use crate::sql::{Source, Statement};

pub(crate) struct Session {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Progress of one call, shared between its future and the blocking task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Queued,
    Running,
    Done,
    Abandoned,
}

/// Skips or interrupts the call when its future is dropped unfinished.
struct CancelOnDrop {
    call: Arc<Mutex<Call>>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Ok(mut call) = self.call.lock() else {
            return;
        };
        match *call {
            Call::Queued => *call = Call::Abandoned,
            Call::Running => {
                // The connection lock is held by this call until it marks
                // itself done, so the interrupt cannot hit another statement.
                debug!("interrupting abandoned duckdb statement");
                self.interrupt.interrupt();
                *call = Call::Abandoned;
            }
            Call::Done | Call::Abandoned => {}
        }
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| Error::Poisoned("duckdb session"))
}

fn lock_call(call: &Mutex<Call>) -> Result<MutexGuard<'_, Call>> {
    call.lock().map_err(|_| Error::Poisoned("duckdb call"))
}

/// Runs `work` with the connection held, unless the call was abandoned
/// while it waited.
fn run_locked<T>(
    conn: &Mutex<Connection>,
    call: &Mutex<Call>,
    work: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let conn = lock(conn)?;
    {
        let mut state = lock_call(call)?;
        if *state == Call::Abandoned {
            return Err(Error::Interrupted);
        }
        *state = Call::Running;
    }
    let out = work(&conn);
    *lock_call(call)? = Call::Done;
    out
}

fn query_rows<T>(
    conn: &Connection,
    stage: &'static str,
    stmt: &Statement,
    decode: Decode<T>,
) -> Result<Vec<T>> {
    let mut prepared = conn.prepare(&stmt.sql).stage(stage)?;
    let mut rows = prepared
        .query(duckdb::params_from_iter(stmt.args.iter()))
        .stage(stage)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().stage(stage)? {
        out.push(decode(row).stage(stage)?);
    }
    Ok(out)
}

fn execute_on(conn: &Connection, stage: &'static str, stmt: &Statement) -> Result<usize> {
    conn.execute(&stmt.sql, duckdb::params_from_iter(stmt.args.iter()))
        .stage(stage)
}

impl Session {
    /// In-memory database using `threads` worker threads.
    pub async fn open(threads: usize) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open_in_memory().stage("open duckdb")?;
            conn.execute_batch(&format!("SET threads = {threads}"))
                .stage("set threads")?;
            let interrupt = conn.interrupt_handle();
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
                interrupt,
            })
        })
        .await?
    }

    /// Runs `work` on the blocking pool with the connection held.
    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let call = Arc::new(Mutex::new(Call::Queued));
        let _cancel = CancelOnDrop {
            call: Arc::clone(&call),
            interrupt: Arc::clone(&self.interrupt),
        };
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || run_locked(&conn, &call, work)).await?
    }

    pub async fn query<T: Send + 'static>(
        &self,
        stage: &'static str,
        stmt: &Statement,
        decode: Decode<T>,
    ) -> Result<Vec<T>> {
        let stmt = stmt.clone();
        self.run(move |conn| query_rows(conn, stage, &stmt, decode))
            .await
    }

    pub async fn execute(&self, stage: &'static str, stmt: &Statement) -> Result<usize> {
        let stmt = stmt.clone();
        self.run(move |conn| execute_on(conn, stage, &stmt)).await
    }

    /// Runs `stmt` to completion even when the caller stops waiting.
    pub async fn execute_detached(&self, stage: &'static str, stmt: &Statement) -> Result<usize> {
        let stmt = stmt.clone();
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || execute_on(&*lock(&conn)?, stage, &stmt)).await?
    }

    /// Attaches the relational store read-only as `sqlite_db`.
    ///
    /// Returns whether the scanner is usable; failures are logged and
    /// leave the session without it.
    pub async fn attach_sqlite(&self, path: &Path) -> Result<bool> {
        let path: PathBuf = path.to_path_buf();
        self.run(move |conn| {
            if let Err(e) = conn.execute_batch("INSTALL sqlite; LOAD sqlite;") {
                warn!(error = %e, "sqlite scanner extension unavailable, using the relational engine");
                return Ok(false);
            }
            let escaped = path.display().to_string().replace('\'', "''");
            let attach = format!("ATTACH '{escaped}' AS sqlite_db (TYPE sqlite, READ_ONLY)");
            match conn.execute_batch(&attach) {
                Ok(()) => {
                    debug!(path = %path.display(), "sqlite scanner attached");
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "failed to attach the relational store, using the relational engine");
                    Ok(false)
                }
            }
        })
        .await
    }

    pub fn close(self) -> Result<()> {
        let Self { conn, interrupt } = self;
        drop(interrupt);
        match Arc::try_unwrap(conn) {
            Ok(conn) => {
                let conn = conn
                    .into_inner()
                    .map_err(|_| Error::Poisoned("duckdb session"))?;
                conn.close().map_err(|(_, e)| e).stage("close duckdb")
            }
            Err(_) => {
                debug!("duckdb statement still running, connection closes when it finishes");
                Ok(())
            }
        }
    }
}

/// Statements against one source through the session.
pub(crate) struct Columnar<'a> {
    pub session: &'a Session,
    pub source: &'a Source,
}

impl Fetch for Columnar<'_> {
    fn source(&self) -> &Source {
        self.source
    }

    async fn fetch<T: Send + 'static>(
        &self,
        stage: &'static str,
        stmt: &Statement,
        decode: Decode<T>,
    ) -> Result<Vec<T>> {
        self.session.query(stage, stmt, decode).await
    }
}
