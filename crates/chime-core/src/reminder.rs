//! Reminder entity and composite key — shared between the scheduler and the ingress.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Separator used in the stored form of a key. Key parts may not contain it.
pub const KEY_SEPARATOR: char = '/';

/// Composite identity of a reminder: `(actor_type, actor_id, name)`.
///
/// Stored as `actor_type/actor_id/name` in the `target` primary-key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
}

impl ReminderKey {
    /// Validated constructor: every part non-empty and free of `/`.
    pub fn new(actor_type: &str, actor_id: &str, name: &str) -> Result<Self> {
        for (field, value) in [
            ("actorType", actor_type),
            ("actorID", actor_id),
            ("name", name),
        ] {
            if value.is_empty() {
                return Err(CoreError::InvalidKey(format!("{field} is empty")));
            }
            if value.contains(KEY_SEPARATOR) {
                return Err(CoreError::InvalidKey(format!(
                    "{field} contains '{KEY_SEPARATOR}'"
                )));
            }
        }
        Ok(Self {
            actor_type: actor_type.to_string(),
            actor_id: actor_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Storage form: `actor_type/actor_id/name`.
    pub fn format(&self) -> String {
        format!("{}/{}/{}", self.actor_type, self.actor_id, self.name)
    }

    /// Parse the storage form back into a key.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(actor_type), Some(actor_id), Some(name), None) => {
                Self::new(actor_type, actor_id, name)
            }
            _ => Err(CoreError::InvalidKey(format!(
                "expected actor_type/actor_id/name, got {s:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.actor_type,
            self.actor_id,
            self.name,
            sep = KEY_SEPARATOR
        )
    }
}

/// A persisted reminder record. All instants are milliseconds since the Unix
/// epoch; durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub actor_type: String,
    pub actor_id: String,
    pub name: String,
    /// When the reminder should fire.
    pub execution_time: i64,
    /// Repeat interval; `None` means one-shot.
    pub period: Option<i64>,
    /// After this instant the reminder is dead and must not fire.
    pub ttl: Option<i64>,
    /// Opaque payload handed back to the callback, never interpreted here.
    pub data: Vec<u8>,
    /// 0 = unleased; otherwise the instant the current lease was acquired.
    /// Only the store advances this.
    pub lease_time: i64,
}

impl Reminder {
    /// The composite key of this reminder. Does not re-validate the parts;
    /// validation happens at [`ReminderKey::new`] on the way in.
    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            actor_type: self.actor_type.clone(),
            actor_id: self.actor_id.clone(),
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_simple_key() {
        let key = ReminderKey::new("worker", "42", "checkpoint").unwrap();
        let s = key.format();
        assert_eq!(s, "worker/42/checkpoint");
        let parsed = ReminderKey::parse(&s).expect("parse failed");
        assert_eq!(parsed, key);
    }

    #[test]
    fn display_matches_storage_form() {
        let key = ReminderKey::new("worker", "42", "checkpoint").unwrap();
        assert_eq!(key.to_string(), key.format());
    }

    #[test]
    fn rejects_empty_part() {
        assert!(ReminderKey::new("worker", "", "checkpoint").is_err());
    }

    #[test]
    fn rejects_separator_in_part() {
        assert!(ReminderKey::new("worker", "4/2", "checkpoint").is_err());
    }

    #[test]
    fn parse_rejects_extra_segments() {
        assert!(ReminderKey::parse("a/b/c/d").is_err());
    }

    #[test]
    fn parse_rejects_missing_segments() {
        assert!(ReminderKey::parse("a/b").is_err());
    }

    #[test]
    fn reminder_key_accessor_matches_fields() {
        let r = Reminder {
            actor_type: "worker".into(),
            actor_id: "42".into(),
            name: "checkpoint".into(),
            execution_time: 1_700_000_000_000,
            period: None,
            ttl: None,
            data: Vec::new(),
            lease_time: 0,
        };
        assert_eq!(r.key().format(), "worker/42/checkpoint");
    }
}
