//! Error taxonomy for the authentication core.
//!
//! Expected failures are explicit variants so the API layer can map them to
//! stable machine-readable kinds and HTTP statuses. `StoreUnavailable` covers
//! internal failures such as the relational store being down; key-value
//! outages degrade inside the session/blacklist stores instead of surfacing
//! here.

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingToken,
    #[error("invalid or revoked token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("user not found")]
    UserNotFound,
    #[error("user account is disabled")]
    UserInactive,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("too many requests, try again in {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },
    #[error("code not found or expired, request a new one")]
    OtpNotFound,
    #[error("code has expired, request a new one")]
    OtpExpired,
    #[error("invalid code, {attempts_remaining} attempts remaining")]
    OtpMismatch { attempts_remaining: u32 },
    #[error("too many failed attempts, request a new code")]
    OtpAttemptsExhausted,
    #[error("failed to deliver the code, try again later")]
    DeliveryFailed,
    #[error("datastore unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable kind for API clients.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::UserNotFound => "user_not_found",
            Self::UserInactive => "user_inactive",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::OtpNotFound => "otp_not_found",
            Self::OtpExpired => "otp_expired",
            Self::OtpMismatch { .. } => "otp_mismatch",
            Self::OtpAttemptsExhausted => "otp_attempts_exhausted",
            Self::DeliveryFailed => "delivery_failed",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// HTTP status the API layer responds with for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::UserNotFound | Self::OtpNotFound => StatusCode::NOT_FOUND,
            Self::UserInactive | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } | Self::OtpAttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
            Self::OtpExpired | Self::OtpMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::DeliveryFailed | Self::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::StoreUnavailable(source) = &self {
            error!("datastore failure behind auth request: {source:#}");
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        let mut response = (self.status(), body).into_response();
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AuthError::MissingToken.kind(), "missing_token");
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 30
            }
            .kind(),
            "rate_limited"
        );
        assert_eq!(
            AuthError::OtpMismatch {
                attempts_remaining: 2
            }
            .kind(),
            "otp_mismatch"
        );
    }

    #[test]
    fn statuses_map_to_transport() {
        assert_eq!(AuthError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 1
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::OtpNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AuthError::RateLimited {
            retry_after_seconds: 30,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("30")
        );
    }

    #[test]
    fn messages_do_not_leak_account_state() {
        // Token failures share one message family; none mention usernames or emails.
        let message = AuthError::InvalidToken.to_string();
        assert!(!message.contains('@'));
    }
}
