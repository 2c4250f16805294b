// Trigger calculation module
//
// Turns a session start instant into the two notification triggers of a session:
// a reminder thirty minutes ahead and an alert at the start itself.

use crate::errors::ValidationError;
use crate::models::{NotificationPayload, ScheduleRequest, Trigger, TriggerKind};
use chrono::{DateTime, Duration, Utc};

/// How long before the session the reminder fires
pub const REMINDER_LEAD_MINUTES: i64 = 30;

/// Compute `(reminder_fire_at, start_fire_at)` for a session instant.
///
/// No clamping is applied: a reminder that already lies in the past is still
/// returned as-is and fires immediately once armed.
pub fn compute_triggers(session_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (session_at - Duration::minutes(REMINDER_LEAD_MINUTES), session_at)
}

/// Parse an ISO-8601 / RFC 3339 instant and normalize it to UTC
pub fn parse_session_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Check required fields and parse the session timestamp
pub fn validate_request(request: &ScheduleRequest) -> Result<DateTime<Utc>, ValidationError> {
    let required = [
        ("userId", &request.user_id),
        ("pushTarget", &request.push_target),
        ("sessionId", &request.session_id),
        ("sessionTimestamp", &request.session_timestamp),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(name.to_string()));
        }
    }

    parse_session_timestamp(&request.session_timestamp)
}

/// Build both triggers, reminder first
pub fn build_triggers(request: &ScheduleRequest, session_at: DateTime<Utc>) -> [Trigger; 2] {
    let (reminder_at, start_at) = compute_triggers(session_at);
    let trigger = |kind: TriggerKind, fire_at: DateTime<Utc>| Trigger {
        kind,
        fire_at,
        payload: NotificationPayload::for_kind(
            kind,
            &request.user_id,
            &request.push_target,
            &request.session_id,
        ),
    };

    [
        trigger(TriggerKind::Reminder, reminder_at),
        trigger(TriggerKind::Start, start_at),
    ]
}
