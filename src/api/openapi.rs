use super::handlers::{auth, health};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Same wiring as the served router; only the document is kept.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// New endpoints go through `.routes(routes!(...))` so they are served and
/// documented in one place. Routes added outside (like `/`) stay undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::logout::logout))
        .routes(routes!(auth::me::me))
        .routes(routes!(
            auth::sessions::list_sessions,
            auth::sessions::revoke_sessions
        ))
        .routes(routes!(auth::password::forgot_password))
        .routes(routes!(auth::password::verify_password_otp))
        .routes(routes!(auth::password::reset_password))
        .routes(routes!(auth::register::request_registration_otp))
        .routes(routes!(auth::register::verify_registration_otp));

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, tokens, and sessions".to_string());

    let mut password_tag = Tag::new("password");
    password_tag.description = Some("OTP-backed password reset".to_string());

    let mut register_tag = Tag::new("register");
    register_tag.description = Some("Registration email verification".to_string());

    router.get_openapi_mut().tags = Some(vec![auth_tag, password_tag, register_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
