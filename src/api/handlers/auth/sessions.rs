//! Session listing and bulk revocation for the current user.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::auth::gate::{self, AuthState};

use super::types::{MessageResponse, SessionInfo, SessionsResponse};

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Active sessions for the caller", body = SessionsResponse),
        (status = 401, description = "Missing, invalid, or expired token")
    ),
    tag = "auth"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let account = match gate::authenticate(&headers, &pool, &auth_state, None).await {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };

    let sessions = auth_state.sessions().list_for_user(account.id).await;
    Json(SessionsResponse {
        sessions: sessions.iter().map(SessionInfo::from).collect(),
    })
    .into_response()
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid, or expired token")
    ),
    tag = "auth"
)]
pub async fn revoke_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let account = match gate::authenticate(&headers, &pool, &auth_state, None).await {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };

    let revoked = auth_state.sessions().revoke_all_for_user(account.id).await;
    info!(username = %account.username, revoked, "revoked all sessions");
    Json(MessageResponse {
        message: format!("Revoked {revoked} sessions"),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::tests::{lazy_pool, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn anonymous_requests_are_unauthorized() {
        let response = list_sessions(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_state())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = revoke_sessions(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_state())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
