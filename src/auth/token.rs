//! Signed token issuance and verification.
//!
//! Tokens are compact JWTs (HS256). Access and refresh tokens are signed with
//! independent secrets, and the embedded `tokenType` claim is checked on top
//! of the signature so a token of one kind can never be accepted where the
//! other is expected, even if the two secrets were misconfigured to the same
//! value. Claims deserialization fails closed on unknown or missing fields.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::accounts::{Account, Role};

/// Access tokens authorize API calls; refresh tokens only mint new access
/// tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub session_id: String,
    pub token_type: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub sub: String,
    pub jti: String,
}

impl Claims {
    /// Seconds until this token expires; zero once it has.
    #[must_use]
    pub fn remaining_seconds(&self) -> i64 {
        (self.exp - now_unix_seconds()).max(0)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token signature or payload")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("unexpected token kind")]
    KindMismatch,
    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

/// Unix seconds, saturating instead of panicking on a misbehaving clock.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KindKeys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Issues and verifies the two token kinds with their respective secrets.
pub struct TokenCodec {
    access: KindKeys,
    refresh: KindKeys,
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        issuer: String,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            access: KindKeys::new(access_secret),
            refresh: KindKeys::new(refresh_secret),
            issuer,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    const fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    const fn ttl_seconds(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl_seconds,
            TokenKind::Refresh => self.refresh_ttl_seconds,
        }
    }

    /// Sign a token of the given kind for an account. Every token gets a
    /// fresh `jti` so two tokens with identical claims are distinguishable.
    pub fn issue(
        &self,
        account: &Account,
        session_id: &str,
        kind: TokenKind,
    ) -> Result<String, TokenError> {
        let now = now_unix_seconds();
        let claims = Claims {
            user_id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role,
            session_id: session_id.to_string(),
            token_type: kind,
            iat: now,
            exp: now + self.ttl_seconds(kind),
            iss: self.issuer.clone(),
            sub: account.id.to_string(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.keys(kind).encoding).map_err(TokenError::Encode)
    }

    /// Like `verify` but tolerates an expired token. Logout needs the claims
    /// of a token that may have just lapsed; everything else about the token
    /// must still check out.
    pub fn verify_allow_expired(
        &self,
        token: &str,
        expected_kind: TokenKind,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["iss"]);

        let data = decode::<Claims>(token, &self.keys(expected_kind).decoding, &validation)
            .map_err(|_| TokenError::Signature)?;

        if data.claims.token_type != expected_kind {
            return Err(TokenError::KindMismatch);
        }

        Ok(data.claims)
    }

    /// Verify signature, expiry, issuer, and kind. The kind check runs after
    /// signature validation so key reuse across kinds still cannot cross the
    /// access/refresh boundary.
    pub fn verify(&self, token: &str, expected_kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = decode::<Claims>(token, &self.keys(expected_kind).decoding, &validation)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Signature,
            })?;

        if data.claims.token_type != expected_kind {
            return Err(TokenError::KindMismatch);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: 42,
            name: "Alice Reyes".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Staff,
            is_active: true,
            password_hash: String::new(),
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"access-secret-for-tests",
            b"refresh-secret-for-tests",
            "kalibro-library".to_string(),
            900,
            7 * 24 * 60 * 60,
        )
    }

    #[test]
    fn issue_and_verify_round_trip() -> Result<(), TokenError> {
        let codec = codec();
        let token = codec.issue(&account(), "session-1", TokenKind::Access)?;
        let claims = codec.verify(&token, TokenKind::Access)?;
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(claims.session_id, "session-1");
        assert_eq!(claims.token_type, TokenKind::Access);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.iss, "kalibro-library");
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp - claims.iat, 900);
        Ok(())
    }

    #[test]
    fn refresh_outlives_access() -> Result<(), TokenError> {
        let codec = codec();
        let token = codec.issue(&account(), "session-1", TokenKind::Refresh)?;
        let claims = codec.verify(&token, TokenKind::Refresh)?;
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
        Ok(())
    }

    #[test]
    fn kinds_never_cross() -> Result<(), TokenError> {
        let codec = codec();
        let refresh = codec.issue(&account(), "session-1", TokenKind::Refresh)?;
        // Distinct secrets: the signature check itself rejects it.
        assert!(matches!(
            codec.verify(&refresh, TokenKind::Access),
            Err(TokenError::Signature)
        ));

        // Same secret for both kinds: the embedded kind claim still rejects it.
        let shared = TokenCodec::new(
            b"shared-secret",
            b"shared-secret",
            "kalibro-library".to_string(),
            900,
            7 * 24 * 60 * 60,
        );
        let refresh = shared.issue(&account(), "session-1", TokenKind::Refresh)?;
        assert!(matches!(
            shared.verify(&refresh, TokenKind::Access),
            Err(TokenError::KindMismatch)
        ));
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<(), TokenError> {
        let codec = codec();
        let now = now_unix_seconds();
        let claims = Claims {
            user_id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Staff,
            session_id: "session-1".to_string(),
            token_type: TokenKind::Access,
            iat: now - 120,
            exp: now - 60,
            iss: "kalibro-library".to_string(),
            sub: "42".to_string(),
            jti: "jti-expired".to_string(),
        };
        let token = encode(&Header::default(), &claims, &codec.access.encoding)
            .map_err(TokenError::Encode)?;
        assert!(matches!(
            codec.verify(&token, TokenKind::Access),
            Err(TokenError::Expired)
        ));
        // The lenient path recovers the claims but still checks everything else.
        let claims = codec.verify_allow_expired(&token, TokenKind::Access)?;
        assert_eq!(claims.session_id, "session-1");
        assert!(matches!(
            codec.verify_allow_expired(&token, TokenKind::Refresh),
            Err(TokenError::Signature)
        ));
        Ok(())
    }

    #[test]
    fn wrong_issuer_is_rejected() -> Result<(), TokenError> {
        let other = TokenCodec::new(
            b"access-secret-for-tests",
            b"refresh-secret-for-tests",
            "someone-else".to_string(),
            900,
            7 * 24 * 60 * 60,
        );
        let token = other.issue(&account(), "session-1", TokenKind::Access)?;
        assert!(matches!(
            codec().verify(&token, TokenKind::Access),
            Err(TokenError::Signature)
        ));
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            codec().verify("not-a-token", TokenKind::Access),
            Err(TokenError::Signature)
        ));
    }

    #[test]
    fn fresh_jti_per_token() -> Result<(), TokenError> {
        let codec = codec();
        let first = codec.issue(&account(), "session-1", TokenKind::Access)?;
        let second = codec.issue(&account(), "session-1", TokenKind::Access)?;
        let first = codec.verify(&first, TokenKind::Access)?;
        let second = codec.verify(&second, TokenKind::Access)?;
        assert_ne!(first.jti, second.jti);
        Ok(())
    }

    #[test]
    fn unknown_claim_fields_fail_closed() {
        let codec = codec();
        // Hand-roll a token whose payload carries an extra field.
        let header = jsonwebtoken::Header::default();
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Padded {
            user_id: i64,
            username: String,
            email: String,
            role: Role,
            session_id: String,
            token_type: TokenKind,
            iat: i64,
            exp: i64,
            iss: String,
            sub: String,
            jti: String,
            surprise: String,
        }
        let now = now_unix_seconds();
        let padded = Padded {
            user_id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Staff,
            session_id: "session-1".to_string(),
            token_type: TokenKind::Access,
            iat: now,
            exp: now + 900,
            iss: "kalibro-library".to_string(),
            sub: "42".to_string(),
            jti: "jti-padded".to_string(),
            surprise: "extra".to_string(),
        };
        let token = encode(&header, &padded, &codec.access.encoding).expect("encode");
        assert!(matches!(
            codec.verify(&token, TokenKind::Access),
            Err(TokenError::Signature)
        ));
    }

    #[test]
    fn remaining_seconds_saturates_at_zero() {
        let now = now_unix_seconds();
        let claims = Claims {
            user_id: 1,
            username: "a".to_string(),
            email: "a@b.c".to_string(),
            role: Role::Student,
            session_id: String::new(),
            token_type: TokenKind::Access,
            iat: now - 100,
            exp: now - 50,
            iss: "kalibro-library".to_string(),
            sub: "1".to_string(),
            jti: "j".to_string(),
        };
        assert_eq!(claims.remaining_seconds(), 0);
    }
}
