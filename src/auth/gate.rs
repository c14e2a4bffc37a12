//! Request authentication and the token lifecycle.
//!
//! The gate is the only place requests cross from "has a token" to "is this
//! user". It verifies the access token, consults the blacklist, re-fetches
//! the account row, and enforces role requirements. Claims are treated as a
//! locator only; role and active status always come from the fresh row, so a
//! deactivated user is cut off within one access-token lifetime at worst.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use crate::accounts::{self, Account, Role};
use crate::auth::blacklist::Blacklist;
use crate::auth::error::AuthError;
use crate::auth::otp::OtpEngine;
use crate::auth::session::{generate_session_id, sha256_hex, SessionStore};
use crate::auth::token::{TokenCodec, TokenError, TokenKind};
use crate::email::EmailSender;

const DEFAULT_ACCESS_COOKIE: &str = "kalibro_token";
const DEFAULT_REFRESH_COOKIE: &str = "kalibro_refresh_token";

/// Shared authentication state: codec, stores, throttle, and mailer.
#[derive(Clone)]
pub struct AuthState {
    codec: Arc<TokenCodec>,
    sessions: SessionStore,
    blacklist: Blacklist,
    otp: OtpEngine,
    mailer: Arc<dyn EmailSender>,
    access_cookie_name: String,
    refresh_cookie_name: String,
}

impl AuthState {
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        sessions: SessionStore,
        blacklist: Blacklist,
        otp: OtpEngine,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            codec: Arc::new(codec),
            sessions,
            blacklist,
            otp,
            mailer,
            access_cookie_name: DEFAULT_ACCESS_COOKIE.to_string(),
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE.to_string(),
        }
    }

    #[must_use]
    pub fn with_cookie_names(mut self, access: String, refresh: String) -> Self {
        self.access_cookie_name = access;
        self.refresh_cookie_name = refresh;
        self
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub const fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    #[must_use]
    pub const fn otp(&self) -> &OtpEngine {
        &self.otp
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn EmailSender {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn access_cookie_name(&self) -> &str {
        &self.access_cookie_name
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> &str {
        &self.refresh_cookie_name
    }
}

/// Where a request carried its tokens from.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: String,
    pub ip_address: String,
}

/// Freshly issued access/refresh pair and its session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
}

/// `Authorization: Bearer <token>` header, if present and well-formed.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Named cookie from the `Cookie` header, if present.
#[must_use]
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Bearer header first, cookie fallback.
#[must_use]
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, cookie_name))
}

fn map_token_error(err: &TokenError) -> AuthError {
    match err {
        TokenError::Expired => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    }
}

/// Authenticate a request and return the fresh account row.
///
/// A valid token whose session record has lapsed still authenticates; the
/// record is an audit aid, and blacklist plus account state carry the
/// security decisions.
pub async fn authenticate(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    required_role: Option<Role>,
) -> Result<Account, AuthError> {
    let token =
        extract_token(headers, state.access_cookie_name()).ok_or(AuthError::MissingToken)?;

    let claims = state
        .codec()
        .verify(&token, TokenKind::Access)
        .map_err(|err| map_token_error(&err))?;

    if state.blacklist().is_blacklisted(&token, TokenKind::Access).await {
        return Err(AuthError::InvalidToken);
    }

    let account = accounts::find_by_id(pool, claims.user_id)
        .await
        .map_err(AuthError::StoreUnavailable)?
        .ok_or(AuthError::UserNotFound)?;
    if !account.is_active {
        return Err(AuthError::UserInactive);
    }

    state.sessions().touch(&claims.session_id).await;

    if let Some(required) = required_role {
        if !account.role.satisfies(required) {
            return Err(AuthError::Forbidden);
        }
    }

    Ok(account)
}

/// Mint an access/refresh pair bound to a fresh session id.
pub fn issue_token_pair(state: &AuthState, account: &Account) -> Result<TokenPair, AuthError> {
    let session_id = generate_session_id();
    let access_token = state
        .codec()
        .issue(account, &session_id, TokenKind::Access)
        .map_err(|err| AuthError::StoreUnavailable(err.into()))?;
    let refresh_token = state
        .codec()
        .issue(account, &session_id, TokenKind::Refresh)
        .map_err(|err| AuthError::StoreUnavailable(err.into()))?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        session_id,
    })
}

/// Issue a pair and persist its session record.
pub async fn login_tokens(
    state: &AuthState,
    account: &Account,
    meta: &ClientMeta,
) -> Result<TokenPair, AuthError> {
    let pair = issue_token_pair(state, account)?;
    state
        .sessions()
        .create(
            &pair.session_id,
            account.id,
            &pair.access_token,
            &pair.refresh_token,
            &meta.user_agent,
            &meta.ip_address,
        )
        .await;
    Ok(pair)
}

/// Trade a refresh token for a new access token on the same session.
pub async fn refresh_access_token(
    pool: &PgPool,
    state: &AuthState,
    refresh_token: &str,
) -> Result<(String, Account), AuthError> {
    let claims = state
        .codec()
        .verify(refresh_token, TokenKind::Refresh)
        .map_err(|err| map_token_error(&err))?;

    if state
        .blacklist()
        .is_blacklisted(refresh_token, TokenKind::Refresh)
        .await
    {
        return Err(AuthError::InvalidToken);
    }

    // The refresh path is stricter than authentication: the session record
    // must exist, be active, and still point at this refresh token.
    let session = state
        .sessions()
        .get(&claims.session_id)
        .await
        .ok_or(AuthError::InvalidToken)?;
    if !session.is_active || session.refresh_fingerprint != sha256_hex(refresh_token) {
        return Err(AuthError::InvalidToken);
    }

    let account = accounts::find_by_id(pool, claims.user_id)
        .await
        .map_err(AuthError::StoreUnavailable)?
        .ok_or(AuthError::UserNotFound)?;
    if !account.is_active {
        return Err(AuthError::UserInactive);
    }

    let access_token = state
        .codec()
        .issue(&account, &claims.session_id, TokenKind::Access)
        .map_err(|err| AuthError::StoreUnavailable(err.into()))?;
    state
        .sessions()
        .rotate_access_fingerprint(&claims.session_id, &access_token)
        .await;

    Ok((access_token, account))
}

/// Revoke tokens at logout. Best-effort and idempotent: unreadable tokens
/// are skipped, already-revoked ones are harmless to revoke again.
pub async fn logout(
    state: &AuthState,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    all_devices: bool,
) {
    let mut user_id = None;

    if let Some(token) = access_token {
        match state.codec().verify_allow_expired(token, TokenKind::Access) {
            Ok(claims) => {
                user_id = Some(claims.user_id);
                state
                    .blacklist()
                    .insert(token, TokenKind::Access, claims.remaining_seconds())
                    .await;
                state
                    .sessions()
                    .revoke(&claims.session_id, TokenKind::Access)
                    .await;
            }
            Err(err) => debug!("skipping unreadable access token at logout: {err}"),
        }
    }

    if let Some(token) = refresh_token {
        match state.codec().verify_allow_expired(token, TokenKind::Refresh) {
            Ok(claims) => {
                user_id = user_id.or(Some(claims.user_id));
                state
                    .blacklist()
                    .insert(token, TokenKind::Refresh, claims.remaining_seconds())
                    .await;
                state
                    .sessions()
                    .revoke(&claims.session_id, TokenKind::Refresh)
                    .await;
            }
            Err(err) => debug!("skipping unreadable refresh token at logout: {err}"),
        }
    }

    if all_devices {
        if let Some(user_id) = user_id {
            state.sessions().revoke_all_for_user(user_id).await;
        }
    }
}
