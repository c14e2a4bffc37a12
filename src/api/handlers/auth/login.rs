//! Login endpoint: credentials in, token pair and cookies out.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use crate::accounts;
use crate::auth::error::AuthError;
use crate::auth::gate::{self, AuthState};
use crate::auth::otp::OtpPurpose;

use super::state::AuthConfig;
use super::types::{LoginRequest, LoginResponse, UserSummary};
use super::utils::{client_meta, extract_client_ip, token_cookie};

fn invalid_credentials() -> axum::response::Response {
    // One generic message for bad username, bad password, and disabled
    // accounts, so responses cannot be used to enumerate users.
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "invalid_credentials",
            "message": "Invalid username or password",
        })),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many failed attempts from this client")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Username and password are required".to_string(),
        )
            .into_response();
    }

    // Lockout is keyed by client IP and checked before credentials so a
    // locked-out client learns nothing about the account.
    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    if let Some(retry_after_seconds) = auth_state
        .otp()
        .is_limited(OtpPurpose::Login, &client_ip)
        .await
    {
        return AuthError::RateLimited {
            retry_after_seconds,
        }
        .into_response();
    }

    let account = match accounts::find_by_username_or_email(&pool, username).await {
        Ok(account) => account,
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    };

    // Verify against a dummy hash when no account matched, so response
    // timing does not reveal whether a username exists.
    let password_ok = match &account {
        Some(account) => accounts::verify_password(&request.password, &account.password_hash),
        None => {
            accounts::burn_password_verification(&request.password);
            false
        }
    };

    let Some(account) = account.filter(|account| password_ok && account.is_active) else {
        auth_state
            .otp()
            .record_failure(OtpPurpose::Login, &client_ip)
            .await;
        return invalid_credentials();
    };

    auth_state
        .otp()
        .clear_failures(OtpPurpose::Login, &client_ip)
        .await;

    let meta = client_meta(&headers);
    let pair = match gate::login_tokens(&auth_state, &account, &meta).await {
        Ok(pair) => pair,
        Err(err) => return err.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    let secure = config.cookie_secure();
    if let Ok(cookie) = token_cookie(
        auth_state.access_cookie_name(),
        &pair.access_token,
        config.access_ttl_seconds(),
        secure,
    ) {
        response_headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = token_cookie(
        auth_state.refresh_cookie_name(),
        &pair.refresh_token,
        config.refresh_ttl_seconds(),
        secure,
    ) {
        response_headers.append(SET_COOKIE, cookie);
    } else {
        error!("failed to build refresh cookie");
    }

    info!(
        username = %account.username,
        role = account.role.as_str(),
        client_ip = %meta.ip_address,
        "login"
    );

    let response = LoginResponse {
        message: "Login successful".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: UserSummary::from(&account),
    };
    (StatusCode::OK, response_headers, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::tests::{lazy_pool, test_config, test_state};
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn missing_payload_is_a_bad_request() {
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_config())),
            Extension(Arc::new(test_state())),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_credentials_are_a_bad_request() {
        let payload = LoginRequest {
            username: "  ".to_string(),
            password: String::new(),
        };
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_config())),
            Extension(Arc::new(test_state())),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn locked_out_client_is_rejected_before_lookup() {
        let state = test_state();
        for _ in 0..5 {
            state
                .otp()
                .record_failure(OtpPurpose::Login, "203.0.113.9")
                .await;
        }

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        let payload = LoginRequest {
            username: "alice".to_string(),
            password: "password".to_string(),
        };
        // The lazy pool never connects; reaching the lookup would error with
        // 500, so a 429 here proves the lockout fired first.
        let response = login(
            headers,
            Extension(lazy_pool()),
            Extension(Arc::new(test_config())),
            Extension(Arc::new(state)),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
