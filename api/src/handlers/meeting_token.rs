use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::errors::TokenError;
use common::meeting_token::MeetingTokenRequest;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Issue a signed meeting token for a session participant
#[tracing::instrument(skip(state, payload))]
pub async fn generate_jwt(
    State(state): State<AppState>,
    payload: Result<Json<MeetingTokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ErrorResponse> {
    let Json(req) = payload.map_err(|e| ErrorResponse::new("invalid_request", e.body_text()))?;

    let token = state.meeting_tokens.issue(&req).map_err(|e| {
        let category = match &e {
            TokenError::InvalidRoleType(_) => "validation_error",
            TokenError::NotConfigured => "not_configured",
            TokenError::SigningFailed(_) => "internal_error",
        };
        tracing::warn!(error = %e, "Failed to issue meeting token");
        ErrorResponse::new(category, e.to_string())
    })?;

    Ok(Json(TokenResponse { token }))
}
