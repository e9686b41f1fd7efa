//! Durable reminder store with lease-based acquisition.
//!
//! The store is the only resource shared across worker processes, so every
//! multi-step operation here is a single atomic statement or one transaction.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, TransactionBehavior};
use tracing::{error, instrument};

use chime_core::reminder::{Reminder, ReminderKey};

use crate::error::Result;

/// Outcome of a fire attempt (see [`ReminderStore::fire_under_lease`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// One-shot reminder: callback ran, row deleted.
    Completed,
    /// Repeating reminder: callback ran, `execution_time` advanced by the
    /// period and the lease released.
    Rescheduled,
    /// TTL elapsed: row deleted, callback suppressed.
    Expired,
    /// The row was replaced, deleted, or re-leased since this copy was
    /// acquired: callback suppressed.
    LeaseLost,
}

/// Thread-safe handle to the reminders table.
///
/// Wraps a single SQLite connection in a `Mutex`; clones share the
/// connection. Components that must not contend for the same handle (the
/// ingress surface vs. the firing transaction) each get their own store over
/// their own connection to the same file.
#[derive(Clone)]
pub struct ReminderStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReminderStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Insert or replace by composite key. A replaced row loses any lease:
    /// `lease_time` is reset to 0, so an in-flight firing of the old version
    /// fails its conditional match.
    #[instrument(skip_all, fields(key = %reminder.key()))]
    pub fn upsert(&self, reminder: &Reminder) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO reminders
                 (target, execution_time, period, ttl, data, lease_time)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            rusqlite::params![
                reminder.key().format(),
                reminder.execution_time,
                reminder.period,
                reminder.ttl,
                reminder.data,
            ],
        )?;
        Ok(())
    }

    /// Unconditional delete by composite key. Returns whether a row was
    /// removed; deleting an absent key is not an error.
    #[instrument(skip(self), fields(key = %key))]
    pub fn delete(&self, key: &ReminderKey) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM reminders WHERE target = ?1", [key.format()])?;
        Ok(n > 0)
    }

    /// Atomically lease up to `batch_size` due-soon rows and return them.
    ///
    /// A row is eligible when its `execution_time` falls inside the
    /// fetch-ahead window and it is unleased or its lease has expired. The
    /// UPDATE stamps `lease_time = now` on the selected rows in the same
    /// statement, so two concurrent callers can never lease the same row.
    /// Returned reminders carry the new `lease_time`, which the fire path
    /// later presents to prove ownership.
    #[instrument(skip(self))]
    pub fn acquire_next_batch(
        &self,
        now_ms: i64,
        fetch_ahead_ms: i64,
        lease_duration_ms: i64,
        batch_size: usize,
    ) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "UPDATE reminders
             SET lease_time = ?1
             WHERE target IN (
                 SELECT target FROM reminders
                 WHERE execution_time < ?2
                   AND lease_time < ?3
                 ORDER BY execution_time ASC, target ASC
                 LIMIT ?4
             )
             RETURNING target, execution_time, period, ttl, data, lease_time",
        )?;
        let mut batch: Vec<Reminder> = stmt
            .query_map(
                rusqlite::params![
                    now_ms,
                    now_ms + fetch_ahead_ms,
                    now_ms - lease_duration_ms,
                    batch_size as i64,
                ],
                row_to_reminder,
            )?
            .filter_map(|row| match row {
                Ok(reminder) => Some(reminder),
                Err(e) => {
                    error!("skipping unreadable reminder row: {e}");
                    None
                }
            })
            .collect();
        // RETURNING does not guarantee row order; restore the scan order.
        batch.sort_by(|a, b| {
            (a.execution_time, a.key().format()).cmp(&(b.execution_time, b.key().format()))
        });
        Ok(batch)
    }

    /// Execute the fire path for a leased reminder inside one transaction.
    ///
    /// The conditional `WHERE target = ? AND lease_time = ?` match is the
    /// at-most-once gate: zero rows matched means the row was replaced,
    /// deleted, or re-leased since acquisition, and the callback is
    /// suppressed. When the match holds:
    ///
    /// - expired TTL: the row is deleted and the callback is suppressed;
    /// - repeating reminder: `execution_time` advances by the period, the
    ///   lease is released, and the callback runs;
    /// - one-shot: the row is deleted and the callback runs.
    ///
    /// The callback runs before the commit, so a crash mid-callback rolls the
    /// consume back and the firing is redelivered after lease expiry. A
    /// panicking callback is caught and logged, and the transaction still
    /// commits — that firing happened.
    #[instrument(skip_all, fields(key = %reminder.key()))]
    pub fn fire_under_lease(
        &self,
        reminder: &Reminder,
        now_ms: i64,
        run: impl FnOnce(&Reminder),
    ) -> Result<FireOutcome> {
        let target = reminder.key().format();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dead reminders are consumed without firing.
        if reminder.ttl.is_some_and(|ttl| now_ms > ttl) {
            let n = tx.execute(
                "DELETE FROM reminders WHERE target = ?1 AND lease_time = ?2",
                rusqlite::params![target, reminder.lease_time],
            )?;
            if n == 0 {
                return Ok(FireOutcome::LeaseLost);
            }
            tx.commit()?;
            return Ok(FireOutcome::Expired);
        }

        let outcome = match reminder.period {
            Some(period) if period > 0 => {
                let n = tx.execute(
                    "UPDATE reminders
                     SET execution_time = execution_time + ?1, lease_time = 0
                     WHERE target = ?2 AND lease_time = ?3",
                    rusqlite::params![period, target, reminder.lease_time],
                )?;
                if n == 0 {
                    return Ok(FireOutcome::LeaseLost);
                }
                FireOutcome::Rescheduled
            }
            _ => {
                let n = tx.execute(
                    "DELETE FROM reminders WHERE target = ?1 AND lease_time = ?2",
                    rusqlite::params![target, reminder.lease_time],
                )?;
                if n == 0 {
                    return Ok(FireOutcome::LeaseLost);
                }
                FireOutcome::Completed
            }
        };

        if catch_unwind(AssertUnwindSafe(|| run(reminder))).is_err() {
            error!(key = %target, "reminder callback panicked");
        }

        tx.commit()?;
        Ok(outcome)
    }
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    let target: String = row.get(0)?;
    let key = ReminderKey::parse(&target).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Reminder {
        actor_type: key.actor_type,
        actor_id: key.actor_id,
        name: key.name,
        execution_time: row.get(1)?,
        period: row.get(2)?,
        ttl: row.get(3)?,
        data: row.get(4)?,
        lease_time: row.get(5)?,
    })
}
