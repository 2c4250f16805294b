// Meeting token issuing
// HS256 tokens that let a participant join a video session

use crate::config::MeetingTokenConfig;
use crate::errors::TokenError;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};

/// Claims carried by a meeting token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingClaims {
    pub app_key: String,
    pub version: u8,
    pub user_identity: String,
    pub iat: i64,
    pub exp: i64,
    /// Session (topic) name
    pub tpc: String,
    pub role_type: i64,
    pub cloud_recording_option: u8,
}

/// Token request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingTokenRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_name: String,
    /// Integer role sent as a string by clients
    #[serde(default)]
    pub role_type: String,
}

/// Signs meeting tokens with the configured app secret
#[derive(Clone)]
pub struct MeetingTokenService {
    app_key: String,
    encoding_key: Option<Arc<EncodingKey>>,
    expiration_hours: i64,
}

impl MeetingTokenService {
    /// An empty app secret leaves the service unconfigured; every issue call
    /// then fails with [`TokenError::NotConfigured`].
    pub fn new(config: &MeetingTokenConfig) -> Self {
        let encoding_key = (!config.app_secret.is_empty())
            .then(|| Arc::new(EncodingKey::from_secret(config.app_secret.as_bytes())));

        Self {
            app_key: config.app_key.clone(),
            encoding_key,
            expiration_hours: config.expiration_hours,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Build the claims for a request without signing them
    pub fn claims_for(&self, request: &MeetingTokenRequest) -> Result<MeetingClaims, TokenError> {
        let role_type = request
            .role_type
            .trim()
            .parse::<i64>()
            .map_err(|_| TokenError::InvalidRoleType(request.role_type.clone()))?;

        let now = Utc::now();
        Ok(MeetingClaims {
            app_key: self.app_key.clone(),
            version: 1,
            user_identity: request.user_id.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiration_hours)).timestamp(),
            tpc: request.session_name.clone(),
            role_type,
            cloud_recording_option: 1,
        })
    }

    /// Issue a signed token
    #[instrument(skip(self, request), fields(user_id = %request.user_id, session_name = %request.session_name))]
    pub fn issue(&self, request: &MeetingTokenRequest) -> Result<String, TokenError> {
        let claims = self.claims_for(request)?;
        let key = self.encoding_key.as_ref().ok_or(TokenError::NotConfigured)?;

        encode(&Header::default(), &claims, key).map_err(|e| {
            error!(error = %e, "Failed to sign meeting token");
            TokenError::SigningFailed(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    fn service(secret: &str) -> MeetingTokenService {
        MeetingTokenService::new(&MeetingTokenConfig {
            app_key: "app-key".to_string(),
            app_secret: secret.to_string(),
            expiration_hours: 23,
        })
    }

    fn request(role_type: &str) -> MeetingTokenRequest {
        MeetingTokenRequest {
            user_id: "u1".to_string(),
            session_name: "s1".to_string(),
            role_type: role_type.to_string(),
        }
    }

    #[test]
    fn test_issued_token_round_trips() {
        let token = service("top-secret").issue(&request("1")).unwrap();

        let decoded = decode::<MeetingClaims>(
            &token,
            &DecodingKey::from_secret(b"top-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();

        let claims = decoded.claims;
        assert_eq!(claims.app_key, "app-key");
        assert_eq!(claims.version, 1);
        assert_eq!(claims.user_identity, "u1");
        assert_eq!(claims.tpc, "s1");
        assert_eq!(claims.role_type, 1);
        assert_eq!(claims.cloud_recording_option, 1);
        assert_eq!(claims.exp - claims.iat, 23 * 3600);
    }

    #[test]
    fn test_wrong_secret_fails_validation() {
        let token = service("top-secret").issue(&request("0")).unwrap();
        let result = decode::<MeetingClaims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_non_integer_role_type_is_rejected() {
        let err = service("top-secret").issue(&request("host")).unwrap_err();
        assert!(matches!(err, TokenError::InvalidRoleType(value) if value == "host"));
    }

    #[test]
    fn test_missing_secret_is_not_configured() {
        let svc = service("");
        assert!(!svc.is_configured());
        assert!(matches!(
            svc.issue(&request("1")).unwrap_err(),
            TokenError::NotConfigured
        ));
    }
}
