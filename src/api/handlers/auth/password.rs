//! Password reset flow: request a code, verify it, set the new password.
//!
//! Unlike login, this flow may disclose whether an email has an account; the
//! reset form needs to tell the user to check the right inbox.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::accounts;
use crate::auth::error::AuthError;
use crate::auth::gate::AuthState;
use crate::auth::otp::{is_valid_code_format, mask_email, OtpPurpose};
use crate::email::{password_changed_message, password_reset_message};

use super::types::{MessageResponse, OtpRequest, OtpRequestResponse, ResetPasswordRequest, VerifyOtpRequest};
use super::utils::{normalize_email, valid_email, valid_password};

#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Reset code sent", body = OtpRequestResponse),
        (status = 404, description = "No account for this email"),
        (status = 429, description = "Too many codes requested for this email")
    ),
    tag = "password"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let account = match accounts::find_by_username_or_email(&pool, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return AuthError::UserNotFound.into_response(),
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    };

    let mailer = auth_state.mailer();
    let result = auth_state
        .otp()
        .request(OtpPurpose::PasswordReset, &email, |code| {
            mailer.send(&password_reset_message(&account.email, code))
        })
        .await;
    if let Err(err) = result {
        return err.into_response();
    }

    info!(email = %mask_email(&email), "password reset code sent");
    Json(OtpRequestResponse {
        message: "A reset code has been sent to your email".to_string(),
        masked_email: mask_email(&email),
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Code is valid", body = MessageResponse),
        (status = 400, description = "Wrong or expired code"),
        (status = 404, description = "No pending code for this email"),
        (status = 429, description = "Too many failed attempts")
    ),
    tag = "password"
)]
pub async fn verify_password_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let email = normalize_email(&request.email);
    let code = request.otp.trim();
    if !valid_email(&email) || !is_valid_code_format(code) {
        return (StatusCode::BAD_REQUEST, "Invalid email or code".to_string()).into_response();
    }

    match auth_state
        .otp()
        .verify(OtpPurpose::PasswordReset, &email, code)
        .await
    {
        // Deliberately not consumed; the reset request re-verifies it.
        Ok(()) => Json(MessageResponse {
            message: "Code verified".to_string(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated, all sessions revoked", body = MessageResponse),
        (status = 400, description = "Wrong or expired code, or weak password"),
        (status = 404, description = "No pending code or no account"),
        (status = 429, description = "Too many failed attempts")
    ),
    tag = "password"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let email = normalize_email(&request.email);
    let code = request.otp.trim();
    if !valid_email(&email) || !is_valid_code_format(code) {
        return (StatusCode::BAD_REQUEST, "Invalid email or code".to_string()).into_response();
    }
    if !valid_password(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".to_string(),
        )
            .into_response();
    }

    if let Err(err) = auth_state
        .otp()
        .verify(OtpPurpose::PasswordReset, &email, code)
        .await
    {
        return err.into_response();
    }

    let account = match accounts::find_by_username_or_email(&pool, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return AuthError::UserNotFound.into_response(),
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    };

    let password_hash = match accounts::hash_password(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    };
    match accounts::update_password(&pool, account.id, &password_hash).await {
        Ok(true) => {}
        Ok(false) => return AuthError::UserNotFound.into_response(),
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    }

    // The code is spent and every existing session goes with it.
    auth_state
        .otp()
        .consume(OtpPurpose::PasswordReset, &email)
        .await;
    auth_state.sessions().revoke_all_for_user(account.id).await;

    // Confirmation is best-effort; the reset already happened.
    if let Err(err) = auth_state
        .mailer()
        .send(&password_changed_message(&account.email))
    {
        warn!("failed to send password change confirmation: {err}");
    }

    info!(username = %account.username, "password reset completed");
    Json(MessageResponse {
        message: "Password has been reset".to_string(),
    })
    .into_response()
}
