//! Registration email verification: request a code, verify and consume it.
//!
//! Account creation itself is handled by library staff tooling; this flow
//! only proves the applicant controls the address before a record is made.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::accounts;
use crate::auth::error::AuthError;
use crate::auth::gate::AuthState;
use crate::auth::otp::{is_valid_code_format, mask_email, OtpPurpose};
use crate::email::registration_message;

use super::types::{MessageResponse, OtpRequest, OtpRequestResponse, VerifyOtpRequest};
use super::utils::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/register/request-otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "Verification code sent", body = OtpRequestResponse),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many codes requested for this email")
    ),
    tag = "register"
)]
pub async fn request_registration_otp(
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

    match accounts::find_by_username_or_email(&pool, &email).await {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "email_taken",
                    "message": "Email is already registered. Please use another email or login.",
                })),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(err) => return AuthError::StoreUnavailable(err).into_response(),
    }

    let mailer = auth_state.mailer();
    let result = auth_state
        .otp()
        .request(OtpPurpose::Registration, &email, |code| {
            mailer.send(&registration_message(&email, code))
        })
        .await;
    if let Err(err) = result {
        return err.into_response();
    }

    info!(email = %mask_email(&email), "registration code sent");
    Json(OtpRequestResponse {
        message: "A verification code has been sent to your email".to_string(),
        masked_email: mask_email(&email),
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/register/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Wrong or expired code"),
        (status = 404, description = "No pending code for this email"),
        (status = 429, description = "Too many failed attempts")
    ),
    tag = "register"
)]
pub async fn verify_registration_otp(
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
        .verify(OtpPurpose::Registration, &email, code)
        .await
    {
        Ok(()) => {
            // Registration codes are single-shot; a correct answer spends it.
            auth_state
                .otp()
                .consume(OtpPurpose::Registration, &email)
                .await;
            Json(MessageResponse {
                message: "Email verified".to_string(),
            })
            .into_response()
        }
        Err(err) => err.into_response(),
    }
}
