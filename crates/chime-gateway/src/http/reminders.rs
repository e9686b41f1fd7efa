//! POST /reminder and DELETE /reminder — the user-facing ingress.
//!
//! The ingress owns input validation: key parts must be non-empty and free of
//! `/`, and instants arrive as RFC 3339 strings or `"+<duration>"` offsets
//! from now. The scheduler core below assumes well-formed reminders.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use chime_core::reminder::{Reminder, ReminderKey};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReminderRequest {
    #[serde(default)]
    pub actor_type: String,
    #[serde(rename = "actorID", default)]
    pub actor_id: String,
    #[serde(default)]
    pub name: String,
    /// RFC 3339 instant, or "+<duration>" relative to now (e.g. "+90s", "+1h30m").
    #[serde(default)]
    pub execution_time: String,
    /// Repeat interval using the duration grammar ("10s", "5m", ...).
    pub period: Option<String>,
    /// Instant after which the reminder must not fire; same forms as executionTime.
    pub ttl: Option<String>,
    /// Opaque payload stored verbatim and handed back to the callback.
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReminderRequest {
    #[serde(default)]
    pub actor_type: String,
    #[serde(rename = "actorID", default)]
    pub actor_id: String,
    #[serde(default)]
    pub name: String,
}

/// POST /reminder — create or replace a reminder.
pub async fn add_reminder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddReminderRequest>,
) -> (StatusCode, String) {
    let key = match ReminderKey::new(&req.actor_type, &req.actor_id, &req.name) {
        Ok(key) => key,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };
    if req.execution_time.is_empty() {
        return (StatusCode::BAD_REQUEST, "executionTime is empty".into());
    }

    let now = Utc::now();
    let execution_time = match parse_instant(&req.execution_time, now) {
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to parse executionTime: {e}"),
            )
        }
    };
    let period = match req.period.as_deref().map(parse_duration_ms).transpose() {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to parse period: {e}"),
            )
        }
    };
    let ttl = match req.ttl.as_deref().map(|t| parse_instant(t, now)).transpose() {
        Ok(t) => t,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Failed to parse ttl: {e}")),
    };
    let data = req
        .data
        .map(|v| v.to_string().into_bytes())
        .unwrap_or_default();

    let reminder = Reminder {
        actor_type: key.actor_type,
        actor_id: key.actor_id,
        name: key.name,
        execution_time,
        period,
        ttl,
        data,
        lease_time: 0,
    };
    match state.reminders.add(reminder) {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(e) => {
            warn!("failed to add reminder: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to add reminder: {e}"),
            )
        }
    }
}

/// DELETE /reminder — remove a reminder by composite key.
pub async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteReminderRequest>,
) -> (StatusCode, String) {
    let key = match ReminderKey::new(&req.actor_type, &req.actor_id, &req.name) {
        Ok(key) => key,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.reminders.delete(&key) {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(e) => {
            warn!("failed to delete reminder: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete reminder: {e}"),
            )
        }
    }
}

/// Accepts an RFC 3339 instant or a "+<duration>" offset from `now`; returns
/// milliseconds since the epoch.
fn parse_instant(input: &str, now: DateTime<Utc>) -> Result<i64, String> {
    if let Some(rel) = input.strip_prefix('+') {
        let offset = parse_duration_ms(rel)?;
        return Ok(now.timestamp_millis() + offset);
    }
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| e.to_string())
}

/// Duration grammar: one or more integer+unit pairs, e.g. "90s", "5m",
/// "1h30m", "250ms". Must total more than zero.
fn parse_duration_ms(input: &str) -> Result<i64, String> {
    if input.is_empty() {
        return Err("empty duration".into());
    }
    let mut total: i64 = 0;
    let mut digits = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(format!("unexpected '{c}' in duration {input:?}"));
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("bad number in duration {input:?}"))?;
        digits.clear();
        let unit_ms = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            's' => 1000,
            'm' => 60_000,
            'h' => 3_600_000,
            other => return Err(format!("unknown duration unit '{other}'")),
        };
        total += value * unit_ms;
    }
    if !digits.is_empty() {
        return Err(format!("missing unit in duration {input:?}"));
    }
    if total <= 0 {
        return Err("duration must be positive".into());
    }
    Ok(total)
}
