//! Current-user endpoint.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::gate::{self, AuthState};

use super::types::{MeResponse, UserSummary};

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Fresh account data for the caller", body = MeResponse),
        (status = 401, description = "Missing, invalid, or expired token"),
        (status = 403, description = "Account disabled")
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match gate::authenticate(&headers, &pool, &auth_state, None).await {
        Ok(account) => Json(MeResponse {
            user: UserSummary::from(&account),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::tests::{lazy_pool, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn anonymous_request_is_unauthorized() {
        let response = me(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::new(test_state())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
