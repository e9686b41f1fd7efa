use thiserror::Error;

/// Errors that can occur within the reminder scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The reminder key failed validation.
    #[error(transparent)]
    Invalid(#[from] chime_core::error::CoreError),

    /// The processor is closed and no longer accepts reminders.
    #[error("Processor is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
