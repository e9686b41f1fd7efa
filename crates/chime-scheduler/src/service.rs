//! Public façade: add/delete plus the wiring between store and processor.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use chime_core::config::SchedulerConfig;
use chime_core::reminder::{Reminder, ReminderKey};

use crate::clock::Clock;
use crate::error::Result;
use crate::poller::Poller;
use crate::processor::{ExecuteFn, Processor};
use crate::store::{FireOutcome, ReminderStore};

/// User code invoked when a reminder fires. Runs inside the consuming
/// transaction; see [`ReminderStore::fire_under_lease`].
pub type ReminderCallback = Arc<dyn Fn(&Reminder) + Send + Sync>;

pub struct ReminderService {
    store: ReminderStore,
    fire_store: ReminderStore,
    clock: Arc<dyn Clock>,
    processor: Processor,
}

impl ReminderService {
    /// Wire the pipeline. `store` serves the add/delete surface; `fire_store`
    /// backs the poller and the firing transaction and should wrap its own
    /// connection, so a callback that re-enters [`add`](Self::add) or
    /// [`delete`](Self::delete) never contends for the handle its own firing
    /// holds.
    ///
    /// The callback is captured here, before the processor exists, so the
    /// dispatch loop only ever sees one opaque execute hook.
    pub fn new(
        store: ReminderStore,
        fire_store: ReminderStore,
        clock: Arc<dyn Clock>,
        callback: ReminderCallback,
    ) -> Self {
        let execute = fire_path(fire_store.clone(), Arc::clone(&clock), callback);
        let processor = Processor::new(Arc::clone(&clock), execute);
        Self {
            store,
            fire_store,
            clock,
            processor,
        }
    }

    /// Spawn the dispatch loop and the poller. Both stop when `shutdown`
    /// flips to `true` (or its sender is dropped).
    pub fn start(&self, config: SchedulerConfig, shutdown: watch::Receiver<bool>) {
        let poller = Poller::new(
            self.fire_store.clone(),
            self.processor.clone(),
            Arc::clone(&self.clock),
            config,
        );
        tokio::spawn(self.processor.clone().run(shutdown.clone()));
        tokio::spawn(poller.run(shutdown));
    }

    /// Create or replace a reminder.
    ///
    /// The upsert lands before the in-memory invalidation: if a firing of the
    /// old version sneaks in between, its conditional match finds
    /// `lease_time` reset and suppresses itself, so the dequeue is only a
    /// best-effort fast path.
    #[instrument(skip_all, fields(key = %reminder.key()))]
    pub fn add(&self, reminder: Reminder) -> Result<()> {
        let key = ReminderKey::new(&reminder.actor_type, &reminder.actor_id, &reminder.name)?;
        self.store.upsert(&reminder)?;
        // Invalidate any queued copy of a previous version of this key.
        self.processor.dequeue(&key);
        Ok(())
    }

    /// Delete a reminder. Deleting an absent key succeeds silently.
    #[instrument(skip(self), fields(key = %key))]
    pub fn delete(&self, key: &ReminderKey) -> Result<()> {
        if !self.store.delete(key)? {
            debug!(key = %key, "no stored reminder to delete");
        }
        self.processor.dequeue(key);
        Ok(())
    }

    /// Stop dispatching; queued entries are dropped without firing and the
    /// poller's next enqueue attempts fail. Leases recover on their own.
    pub fn close(&self) {
        self.processor.close();
    }
}

/// Build the dispatch-time execute hook: consume the row under its lease,
/// then run the user callback, in one transaction.
fn fire_path(store: ReminderStore, clock: Arc<dyn Clock>, callback: ReminderCallback) -> ExecuteFn {
    Arc::new(move |reminder: Reminder| {
        let key = reminder.key();
        let now = clock.now_millis();
        match store.fire_under_lease(&reminder, now, |due| callback(due)) {
            Ok(FireOutcome::Completed) => debug!(key = %key, "reminder fired"),
            Ok(FireOutcome::Rescheduled) => {
                debug!(key = %key, "repeating reminder fired and rescheduled")
            }
            Ok(FireOutcome::Expired) => info!(key = %key, "reminder expired before firing; removed"),
            Ok(FireOutcome::LeaseLost) => {
                info!(key = %key, "lease lost or reminder replaced; firing suppressed")
            }
            Err(e) => error!(key = %key, "failed to execute reminder: {e}"),
        }
    })
}
