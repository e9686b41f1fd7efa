pub mod config;
pub mod error;
pub mod reminder;

pub use config::ChimeConfig;
pub use error::CoreError;
pub use reminder::{Reminder, ReminderKey};
