use axum::response::IntoResponse;

/// Undocumented landing route; points humans at the API docs.
pub async fn root() -> impl IntoResponse {
    concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION"),
        " - see /swagger-ui"
    )
}
