//! `chime-scheduler` — durable reminder scheduling on SQLite.
//!
//! # Overview
//!
//! Reminders are persisted to a SQLite `reminders` table keyed by
//! `actor_type/actor_id/name`. A [`Poller`] leases due-soon rows in atomic
//! batches and feeds them to the in-memory [`Processor`], which times each
//! firing against an injected [`Clock`] and hands it to the fire path: a
//! conditional delete (or reschedule, for repeating reminders) under the
//! lease, then the user callback, all in one transaction.
//!
//! The conditional match on `(target, lease_time)` is what keeps a scheduled
//! firing at-most-once even when several processes poll the same database:
//! whichever process consumes the row first wins, and every other copy finds
//! zero rows matched and suppresses its callback.

pub mod clock;
pub mod db;
pub mod error;
pub mod poller;
pub mod processor;
pub mod service;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::{Result, SchedulerError};
pub use poller::Poller;
pub use processor::Processor;
pub use service::{ReminderCallback, ReminderService};
pub use store::{FireOutcome, ReminderStore};
