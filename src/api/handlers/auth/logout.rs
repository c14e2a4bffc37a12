//! Logout endpoint. Best-effort revocation, always clears cookies.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::auth::gate::{self, AuthState};

use super::state::AuthConfig;
use super::types::{LogoutRequest, MessageResponse};
use super::utils::clear_cookie;

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Tokens revoked and cookies cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    config: Extension<Arc<AuthConfig>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let all_devices = payload
        .and_then(|Json(request)| request.all_devices)
        .unwrap_or(false);

    let access_token = gate::extract_token(&headers, auth_state.access_cookie_name());
    let refresh_token = gate::extract_cookie(&headers, auth_state.refresh_cookie_name());

    gate::logout(
        &auth_state,
        access_token.as_deref(),
        refresh_token.as_deref(),
        all_devices,
    )
    .await;

    // Always clear the cookies, even when no valid token came in.
    let mut response_headers = HeaderMap::new();
    let secure = config.cookie_secure();
    if let Ok(cookie) = clear_cookie(auth_state.access_cookie_name(), secure) {
        response_headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = clear_cookie(auth_state.refresh_cookie_name(), secure) {
        response_headers.append(SET_COOKIE, cookie);
    }

    (
        StatusCode::OK,
        response_headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response()
}
