//! Injectable time source.
//!
//! The poller and processor never read the wall clock directly; they go
//! through a [`Clock`] so timing-sensitive behavior stays deterministic under
//! test (tests pin a clock to tokio's paused virtual time).

/// Provides the current time as milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Default clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
