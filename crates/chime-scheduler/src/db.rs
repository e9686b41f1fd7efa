use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// How long a writer waits on a locked database before giving up. Two seconds
/// covers a firing transaction that is blocked on a slow callback.
const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Open (or create) the reminders database with pragmas suited to multiple
/// writer processes: WAL journaling plus a busy timeout.
pub fn open_db(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Initialise the reminders schema in `conn`.
///
/// Creates the `reminders` table (idempotent) and the two indexes the lease
/// acquisition query scans: `execution_time` for the due-soon window and
/// `lease_time` for the expired-lease filter.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            target         TEXT    NOT NULL PRIMARY KEY,  -- actor_type/actor_id/name
            execution_time INTEGER NOT NULL,              -- ms since epoch
            period         INTEGER,                       -- repeat interval ms, NULL = one-shot
            ttl            INTEGER,                       -- ms since epoch, NULL = no expiry
            data           BLOB    NOT NULL DEFAULT x'',
            lease_time     INTEGER NOT NULL DEFAULT 0     -- 0 = unleased
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_execution_time ON reminders (execution_time ASC);
        CREATE INDEX IF NOT EXISTS idx_reminders_lease_time     ON reminders (lease_time ASC);
        ",
    )?;
    Ok(())
}
