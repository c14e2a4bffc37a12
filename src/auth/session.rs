//! Session records in the key-value store.
//!
//! A session ties a pair of issued tokens to the device that obtained them.
//! Records live under `session:{id}` with the refresh-token lifetime as TTL,
//! and every user keeps an index set `user:{id}:sessions` so all of their
//! sessions can be enumerated or revoked at once. Only token fingerprints
//! (SHA-256 hex) are stored, never raw tokens.
//!
//! Every operation here is best-effort: a store outage degrades to
//! log-and-continue because revocation safety comes from the blacklist, not
//! from this index.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::auth::token::{now_unix_seconds, TokenKind};
use crate::cache::Cache;

/// SHA-256 fingerprint of a raw token, hex-encoded.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// 256-bit random session id, hex-encoded.
#[must_use]
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(64);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub access_fingerprint: String,
    pub refresh_fingerprint: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: i64,
    pub last_used_at: i64,
    pub expires_at: i64,
    pub is_active: bool,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_unix_seconds()
    }
}

fn session_key(id: &str) -> String {
    format!("session:{id}")
}

fn user_index_key(user_id: i64) -> String {
    format!("user:{user_id}:sessions")
}

/// Session CRUD over the cache adapter.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache,
    ttl_seconds: i64,
}

impl SessionStore {
    #[must_use]
    pub const fn new(cache: Cache, ttl_seconds: i64) -> Self {
        Self { cache, ttl_seconds }
    }

    /// Create a record for a freshly issued token pair and index it under the
    /// owning user.
    pub async fn create(
        &self,
        session_id: &str,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
        user_agent: &str,
        ip_address: &str,
    ) -> Session {
        let now = now_unix_seconds();
        let session = Session {
            id: session_id.to_string(),
            user_id,
            access_fingerprint: sha256_hex(access_token),
            refresh_fingerprint: sha256_hex(refresh_token),
            user_agent: user_agent.to_string(),
            ip_address: ip_address.to_string(),
            created_at: now,
            last_used_at: now,
            expires_at: now + self.ttl_seconds,
            is_active: true,
        };
        if !self.write(&session).await {
            warn!(session_id, "failed to persist session record");
        }
        self.cache.sadd(&user_index_key(user_id), session_id).await;
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let raw = self.cache.get(&session_key(session_id)).await?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(session_id, "dropping undecodable session record: {err}");
                self.cache.del(&session_key(session_id)).await;
                None
            }
        }
    }

    /// Refresh the last-used timestamp. A missing record is a no-op.
    pub async fn touch(&self, session_id: &str) {
        let Some(mut session) = self.get(session_id).await else {
            return;
        };
        session.last_used_at = now_unix_seconds();
        self.write(&session).await;
    }

    /// Point the record at a newly minted access token.
    pub async fn rotate_access_fingerprint(&self, session_id: &str, access_token: &str) {
        let Some(mut session) = self.get(session_id).await else {
            debug!(session_id, "no session record to rotate");
            return;
        };
        session.access_fingerprint = sha256_hex(access_token);
        session.last_used_at = now_unix_seconds();
        self.write(&session).await;
    }

    /// Revoke a session for one token kind. Revoking the access side keeps
    /// the record around, marked inactive, so the refresh token can no longer
    /// use it; revoking the refresh side removes the record and its index
    /// entry entirely.
    pub async fn revoke(&self, session_id: &str, kind: TokenKind) {
        match kind {
            TokenKind::Access => {
                let Some(mut session) = self.get(session_id).await else {
                    return;
                };
                session.is_active = false;
                self.write(&session).await;
            }
            TokenKind::Refresh => {
                if let Some(session) = self.get(session_id).await {
                    self.cache
                        .srem(&user_index_key(session.user_id), session_id)
                        .await;
                }
                self.cache.del(&session_key(session_id)).await;
            }
        }
    }

    /// All live sessions for a user. Inactive or expired records are skipped,
    /// and index entries whose record has already lapsed are pruned.
    pub async fn list_for_user(&self, user_id: i64) -> Vec<Session> {
        let index = user_index_key(user_id);
        let mut sessions = Vec::new();
        for session_id in self.cache.smembers(&index).await {
            match self.get(&session_id).await {
                Some(session) if session.is_active && !session.is_expired() => {
                    sessions.push(session);
                }
                Some(_) => {}
                None => {
                    self.cache.srem(&index, &session_id).await;
                }
            }
        }
        sessions.sort_by_key(|session| std::cmp::Reverse(session.last_used_at));
        sessions
    }

    /// Delete every session a user has, including the index set.
    pub async fn revoke_all_for_user(&self, user_id: i64) -> usize {
        let index = user_index_key(user_id);
        let session_ids = self.cache.smembers(&index).await;
        let mut revoked = 0;
        for session_id in &session_ids {
            if self.cache.del(&session_key(session_id)).await {
                revoked += 1;
            }
        }
        self.cache.del(&index).await;
        revoked
    }

    /// Prune index entries and records that have outlived their expiry.
    /// Storage TTLs already bound staleness; this exists for operators who
    /// want a deterministic cleanup point.
    pub async fn sweep_expired_for_user(&self, user_id: i64) -> usize {
        let index = user_index_key(user_id);
        let mut swept = 0;
        for session_id in self.cache.smembers(&index).await {
            match self.get(&session_id).await {
                Some(session) if session.is_expired() => {
                    self.cache.del(&session_key(&session_id)).await;
                    self.cache.srem(&index, &session_id).await;
                    swept += 1;
                }
                Some(_) => {}
                None => {
                    self.cache.srem(&index, &session_id).await;
                    swept += 1;
                }
            }
        }
        swept
    }

    // Rewrites keep the record's remaining lifetime; a touch or rotate must
    // never push storage past `expires_at`.
    async fn write(&self, session: &Session) -> bool {
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(session_id = %session.id, "failed to encode session: {err}");
                return false;
            }
        };
        let remaining = session.expires_at - now_unix_seconds();
        if remaining <= 0 {
            return false;
        }
        self.cache
            .set_ex(&session_key(&session.id), &raw, remaining)
            .await
    }
}
