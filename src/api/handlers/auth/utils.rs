//! Small helpers for auth validation, client metadata, and cookies.

use axum::http::{
    header::{InvalidHeaderValue, USER_AGENT},
    HeaderMap, HeaderValue,
};
use regex::Regex;

use crate::auth::gate::ClientMeta;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Passwords must carry at least 8 characters. Composition rules live in the
/// frontend; the server only enforces the floor.
pub(super) fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
}

/// Extract a client IP for lockout accounting from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// User agent and client IP for the session record.
pub(super) fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown")
            .to_string(),
        ip_address: extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Build a secure `HttpOnly` cookie holding a token.
pub(super) fn token_cookie(
    name: &str,
    token: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Expire a cookie immediately.
pub(super) fn clear_cookie(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    token_cookie(name, "", 0, secure)
}
