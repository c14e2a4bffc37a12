//! Revoked-token ledger.
//!
//! Logged-out tokens are parked under `blacklist:access:{token}` or
//! `blacklist:refresh:{token}` for exactly their remaining lifetime, after
//! which natural expiry makes the entry redundant and the TTL reclaims it.
//! Kinds get separate namespaces so an access token and a refresh token with
//! the same raw value (impossible in practice, cheap to rule out) never
//! shadow each other.

use tracing::debug;

use crate::auth::token::TokenKind;
use crate::cache::Cache;

const SENTINEL: &str = "revoked";

fn key(kind: TokenKind, token: &str) -> String {
    format!("blacklist:{}:{token}", kind.as_str())
}

#[derive(Clone)]
pub struct Blacklist {
    cache: Cache,
}

impl Blacklist {
    #[must_use]
    pub const fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Park a token for its remaining lifetime. Tokens with no lifetime left
    /// are already dead and are not stored.
    pub async fn insert(&self, token: &str, kind: TokenKind, remaining_seconds: i64) {
        if remaining_seconds <= 0 {
            debug!("skipping blacklist insert for already-expired token");
            return;
        }
        self.cache
            .set_ex(&key(kind, token), SENTINEL, remaining_seconds)
            .await;
    }

    pub async fn is_blacklisted(&self, token: &str, kind: TokenKind) -> bool {
        self.cache.get(&key(kind, token)).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserted_token_is_blacklisted() {
        let blacklist = Blacklist::new(Cache::memory());
        blacklist.insert("tok", TokenKind::Access, 60).await;
        assert!(blacklist.is_blacklisted("tok", TokenKind::Access).await);
        assert!(!blacklist.is_blacklisted("other", TokenKind::Access).await);
    }

    #[tokio::test]
    async fn kinds_are_namespaced() {
        let blacklist = Blacklist::new(Cache::memory());
        blacklist.insert("tok", TokenKind::Access, 60).await;
        assert!(!blacklist.is_blacklisted("tok", TokenKind::Refresh).await);
    }

    #[tokio::test]
    async fn expired_tokens_are_not_stored() {
        let blacklist = Blacklist::new(Cache::memory());
        blacklist.insert("tok", TokenKind::Access, 0).await;
        blacklist.insert("tok", TokenKind::Access, -30).await;
        assert!(!blacklist.is_blacklisted("tok", TokenKind::Access).await);
    }

    #[tokio::test]
    async fn disabled_cache_never_blacklists() {
        let blacklist = Blacklist::new(Cache::disabled());
        blacklist.insert("tok", TokenKind::Access, 60).await;
        assert!(!blacklist.is_blacklisted("tok", TokenKind::Access).await);
    }
}
