use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Request Models
// ============================================================================

/// Incoming request to schedule the notifications of one session.
///
/// Fields default to empty so that missing values are reported by
/// [`crate::triggers::validate_request`] instead of a generic decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub user_id: String,
    /// Device push token. Older clients send it as `userToken`.
    #[serde(default, alias = "userToken")]
    pub push_target: String,
    #[serde(default)]
    pub session_id: String,
    /// ISO-8601 instant with offset
    #[serde(default)]
    pub session_timestamp: String,
}

// ============================================================================
// Trigger Models
// ============================================================================

/// Which of the two session notifications a trigger represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Reminder,
    Start,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Reminder => "reminder",
            TriggerKind::Start => "start",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TriggerKind::Reminder => "Session Reminder",
            TriggerKind::Start => "Session Starting",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            TriggerKind::Reminder => "Your session starts in 30 minutes.",
            TriggerKind::Start => "Your session is starting now.",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(TriggerKind::Reminder),
            "start" => Ok(TriggerKind::Start),
            other => Err(format!("unknown trigger kind: {}", other)),
        }
    }
}

/// Everything the dispatcher needs to deliver one notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub user_id: String,
    pub push_target: String,
    pub session_id: String,
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn for_kind(kind: TriggerKind, user_id: &str, push_target: &str, session_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            push_target: push_target.to_string(),
            session_id: session_id.to_string(),
            title: kind.title().to_string(),
            body: kind.body().to_string(),
        }
    }
}

/// A single future fire-time event derived from a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

// ============================================================================
// Job Models
// ============================================================================

/// Opaque identifier of an armed trigger, assigned by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row to be written to the job store after a trigger was armed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub session_id: String,
    pub job_id: JobId,
    pub kind: TriggerKind,
    pub user_id: String,
    pub push_target: String,
    pub session_timestamp: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

/// Persisted record of an armed trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: i64,
    pub session_id: String,
    pub job_id: JobId,
    pub kind: TriggerKind,
    pub user_id: String,
    pub push_target: String,
    pub session_timestamp: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Rebuild the trigger this job was armed for
    pub fn to_trigger(&self) -> Trigger {
        Trigger {
            kind: self.kind,
            fire_at: self.fire_at,
            payload: NotificationPayload::for_kind(
                self.kind,
                &self.user_id,
                &self.push_target,
                &self.session_id,
            ),
        }
    }
}

// ============================================================================
// History Models
// ============================================================================

/// Entry in a user's notification history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub session_id: String,
    pub push_target: String,
    pub title: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

impl NotificationRecord {
    pub fn sent_now(payload: &NotificationPayload) -> Self {
        Self {
            session_id: payload.session_id.clone(),
            push_target: payload.push_target.clone(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            sent_at: Utc::now(),
            read: false,
        }
    }
}
