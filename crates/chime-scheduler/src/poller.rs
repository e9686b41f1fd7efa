//! Background task that pumps leased store batches into the processor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use chime_core::config::SchedulerConfig;

use crate::clock::Clock;
use crate::processor::Processor;
use crate::store::ReminderStore;

pub struct Poller {
    store: ReminderStore,
    processor: Processor,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Poller {
    pub fn new(
        store: ReminderStore,
        processor: Processor,
        clock: Arc<dyn Clock>,
        mut config: SchedulerConfig,
    ) -> Self {
        // A zero batch would lease nothing forever.
        config.batch_size = config.batch_size.max(1);
        Self {
            store,
            processor,
            clock,
            config,
        }
    }

    /// Poll loop. Runs until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(
            interval_ms = self.config.poll_interval_ms,
            "poller started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        debug!("poller stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One poll: lease a batch and hand each row to the processor.
    ///
    /// Failures are logged and left to lease expiry — the row becomes
    /// eligible again after `lease_duration_ms`. This task never deletes
    /// rows; consumption belongs to the fire path.
    fn tick(&self) {
        let now = self.clock.now_millis();
        let batch = match self.store.acquire_next_batch(
            now,
            self.config.fetch_ahead_ms,
            self.config.lease_duration_ms,
            self.config.batch_size,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                error!("failed to fetch due reminders: {e}");
                return;
            }
        };
        for reminder in batch {
            let key = reminder.key();
            let execution_time = reminder.execution_time;
            match self.processor.enqueue(reminder) {
                Ok(()) => debug!(key = %key, execution_time, "enqueued reminder"),
                Err(e) => warn!(key = %key, "abandoning leased reminder: {e}"),
            }
        }
    }
}
