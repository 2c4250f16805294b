use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::errors::ScheduleRequestError;
use common::models::{NotificationRecord, ScheduleRequest};
use common::notifications::ScheduledSession;

/// Body returned when both notifications of a session were scheduled
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub session: ScheduledSession,
}

impl From<ScheduleRequestError> for ErrorResponse {
    fn from(err: ScheduleRequestError) -> Self {
        ErrorResponse::new(err.category(), err.to_string())
    }
}

/// Schedule the reminder and start notifications of a session
#[tracing::instrument(skip(state, payload))]
pub async fn schedule_notification(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<ScheduleResponse>, ErrorResponse> {
    let Json(req) = payload.map_err(|e| {
        tracing::warn!(error = %e, "Rejected malformed schedule request");
        ErrorResponse::new("invalid_request", e.body_text())
    })?;

    match state.notifications.schedule(&req).await {
        Ok(session) => Ok(Json(ScheduleResponse {
            status: "Notifications scheduled",
            session,
        })),
        Err(e) => {
            if e.is_client_error() {
                tracing::warn!(error = %e, session_id = %req.session_id, "Invalid schedule request");
            } else {
                tracing::error!(error = %e, session_id = %req.session_id, "Failed to schedule notifications");
            }
            Err(e.into())
        }
    }
}

/// A user's delivered notifications, oldest first
#[tracing::instrument(skip(state))]
pub async fn list_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<NotificationRecord>>, ErrorResponse> {
    let records = state.notifications.history(&user_id).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %user_id, "Failed to read notification history");
        ErrorResponse::new("internal_error", e.to_string())
    })?;

    Ok(Json(records))
}
