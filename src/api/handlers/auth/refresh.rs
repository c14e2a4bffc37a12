//! Refresh endpoint: trade a refresh token for a new access token.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::auth::gate::{self, AuthState};

use super::state::AuthConfig;
use super::types::{RefreshRequest, RefreshResponse};
use super::utils::token_cookie;

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, or revoked refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let from_body = payload.and_then(|Json(request)| request.refresh_token);
    let Some(refresh_token) = from_body
        .filter(|token| !token.is_empty())
        .or_else(|| gate::extract_cookie(&headers, auth_state.refresh_cookie_name()))
    else {
        return AuthError::MissingToken.into_response();
    };

    let (access_token, _account) =
        match gate::refresh_access_token(&pool, &auth_state, &refresh_token).await {
            Ok(result) => result,
            Err(err) => return err.into_response(),
        };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = token_cookie(
        auth_state.access_cookie_name(),
        &access_token,
        config.access_ttl_seconds(),
        config.cookie_secure(),
    ) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    (
        StatusCode::OK,
        response_headers,
        Json(RefreshResponse { access_token }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::tests::{lazy_pool, test_config, test_state};

    #[tokio::test]
    async fn missing_refresh_token_is_unauthorized() {
        let response = refresh(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_config())),
            Extension(Arc::new(test_state())),
            Some(Json(RefreshRequest::default())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_unauthorized() {
        let payload = RefreshRequest {
            refresh_token: Some("garbage".to_string()),
        };
        let response = refresh(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_config())),
            Extension(Arc::new(test_state())),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
