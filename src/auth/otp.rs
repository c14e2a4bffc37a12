//! One-time codes and request throttling.
//!
//! Codes and counters are keyed by purpose plus a lowercased identifier:
//! `otp:{purpose}:{identifier}` for the pending code and
//! `otp:rate:{purpose}:{identifier}` for the issuance window. Unlike the
//! session store, failures here are surfaced verbatim. A throttle or
//! verification error that silently degraded would quietly disable brute
//! force protection.

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::auth::error::AuthError;
use crate::auth::token::now_unix_seconds;
use crate::cache::Cache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    PasswordReset,
    Registration,
    /// No codes are issued for this purpose; only the throttle side is used,
    /// to lock out repeated failed logins per client.
    Login,
}

impl OtpPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PasswordReset => "password-reset",
            Self::Registration => "registration",
            Self::Login => "login",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtpRecord {
    code: String,
    expires_at: i64,
    attempts: u32,
    identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateWindow {
    count: u32,
    reset_at: i64,
}

/// Six ASCII digits. Anything else is rejected before touching the store.
#[must_use]
pub fn is_valid_code_format(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Mask an email for display: `jordan@example.com` becomes
/// `jo****@example.com`. Locals shorter than three characters are returned
/// unchanged, matching the lookup pattern, and the mask caps at 8 asterisks
/// so long locals do not reveal their length.
#[must_use]
pub fn mask_email(email: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(.{2})(.*)(@.*)$").unwrap_or_else(|_| unreachable!("static pattern"))
    });
    match pattern.captures(email) {
        Some(caps) => format!("{}{}{}", &caps[1], "*".repeat(caps[2].len().min(8)), &caps[3]),
        None => email.to_string(),
    }
}

fn otp_key(purpose: OtpPurpose, identifier: &str) -> String {
    format!("otp:{}:{identifier}", purpose.as_str())
}

fn rate_key(purpose: OtpPurpose, identifier: &str) -> String {
    format!("otp:rate:{}:{identifier}", purpose.as_str())
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Issues, verifies, and throttles one-time codes.
#[derive(Clone)]
pub struct OtpEngine {
    cache: Cache,
    code_ttl_seconds: i64,
    max_attempts: u32,
    rate_limit: u32,
    rate_window_seconds: i64,
}

impl OtpEngine {
    /// Defaults: 10-minute codes, 5 verification attempts, 5 requests per
    /// 15-minute window.
    #[must_use]
    pub const fn new(cache: Cache) -> Self {
        Self {
            cache,
            code_ttl_seconds: 10 * 60,
            max_attempts: 5,
            rate_limit: 5,
            rate_window_seconds: 15 * 60,
        }
    }

    #[must_use]
    pub const fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, limit: u32, window_seconds: i64) -> Self {
        self.rate_limit = limit;
        self.rate_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub const fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    /// Generate and store a fresh code, then hand it to `deliver`. Any
    /// pending code for the same purpose and identifier is replaced. If
    /// delivery fails the stored code is rolled back so the caller can
    /// retry cleanly.
    pub async fn request<F>(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
        deliver: F,
    ) -> Result<(), AuthError>
    where
        F: FnOnce(&str) -> anyhow::Result<()>,
    {
        let identifier = normalize(identifier);
        self.check_and_count(purpose, &identifier).await?;

        let key = otp_key(purpose, &identifier);
        self.cache.del(&key).await;

        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        let now = now_unix_seconds();
        let record = OtpRecord {
            code: code.clone(),
            expires_at: now + self.code_ttl_seconds,
            attempts: 0,
            identifier: identifier.clone(),
        };
        let raw = serde_json::to_string(&record)
            .map_err(|err| AuthError::StoreUnavailable(err.into()))?;
        if !self.cache.set_ex(&key, &raw, self.code_ttl_seconds).await {
            return Err(AuthError::StoreUnavailable(anyhow::anyhow!(
                "failed to store code record"
            )));
        }

        if let Err(err) = deliver(&code) {
            warn!(%identifier, "code delivery failed, rolling back: {err}");
            self.cache.del(&key).await;
            return Err(AuthError::DeliveryFailed);
        }
        Ok(())
    }

    /// Check a submitted code without consuming it. A correct code leaves the
    /// record in place for the terminal action; wrong codes burn an attempt.
    pub async fn verify(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
        code: &str,
    ) -> Result<(), AuthError> {
        let identifier = normalize(identifier);
        let key = otp_key(purpose, &identifier);

        let Some(raw) = self.cache.get(&key).await else {
            return Err(AuthError::OtpNotFound);
        };
        let mut record: OtpRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(%identifier, "dropping undecodable code record: {err}");
                self.cache.del(&key).await;
                return Err(AuthError::OtpNotFound);
            }
        };

        let now = now_unix_seconds();
        if now > record.expires_at {
            self.cache.del(&key).await;
            return Err(AuthError::OtpExpired);
        }
        if record.attempts >= self.max_attempts {
            self.cache.del(&key).await;
            return Err(AuthError::OtpAttemptsExhausted);
        }

        if record.code != code.trim() {
            record.attempts += 1;
            let remaining = self.max_attempts.saturating_sub(record.attempts);
            // Rewrite with the remaining lifetime; a wrong guess never
            // extends the code.
            let ttl = record.expires_at - now;
            if ttl > 0 {
                if let Ok(raw) = serde_json::to_string(&record) {
                    self.cache.set_ex(&key, &raw, ttl).await;
                }
            }
            return Err(AuthError::OtpMismatch {
                attempts_remaining: remaining,
            });
        }

        Ok(())
    }

    /// Remove a verified code once its terminal action has completed.
    pub async fn consume(&self, purpose: OtpPurpose, identifier: &str) {
        let identifier = normalize(identifier);
        self.cache.del(&otp_key(purpose, &identifier)).await;
    }

    /// Count one issuance against the window, starting a new window when the
    /// previous one has lapsed. Over the limit, reports seconds until reset.
    pub async fn check_and_count(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
    ) -> Result<(), AuthError> {
        let identifier = normalize(identifier);
        let key = rate_key(purpose, &identifier);
        let now = now_unix_seconds();

        let window = match self.cache.get(&key).await {
            Some(raw) => serde_json::from_str::<RateWindow>(&raw).ok(),
            None => None,
        };

        let Some(mut window) = window.filter(|w| now <= w.reset_at) else {
            let fresh = RateWindow {
                count: 1,
                reset_at: now + self.rate_window_seconds,
            };
            if let Ok(raw) = serde_json::to_string(&fresh) {
                self.cache.set_ex(&key, &raw, self.rate_window_seconds).await;
            }
            return Ok(());
        };

        if window.count >= self.rate_limit {
            let retry_after = u64::try_from(window.reset_at - now).unwrap_or(0).max(1);
            return Err(AuthError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }

        window.count += 1;
        let ttl = window.reset_at - now;
        if ttl > 0 {
            if let Ok(raw) = serde_json::to_string(&window) {
                self.cache.set_ex(&key, &raw, ttl).await;
            }
        }
        Ok(())
    }

    /// Lockout check that does not count anything. Used before verifying
    /// login credentials so the check itself cannot lock a client out.
    pub async fn is_limited(&self, purpose: OtpPurpose, identifier: &str) -> Option<u64> {
        let identifier = normalize(identifier);
        let raw = self.cache.get(&rate_key(purpose, &identifier)).await?;
        let window: RateWindow = serde_json::from_str(&raw).ok()?;
        let now = now_unix_seconds();
        if window.count >= self.rate_limit && now <= window.reset_at {
            Some(u64::try_from(window.reset_at - now).unwrap_or(0).max(1))
        } else {
            None
        }
    }

    /// Record a failed attempt against the window without enforcing the
    /// limit. Pairs with `is_limited`.
    pub async fn record_failure(&self, purpose: OtpPurpose, identifier: &str) {
        let identifier = normalize(identifier);
        let key = rate_key(purpose, &identifier);
        let now = now_unix_seconds();

        let window = match self.cache.get(&key).await {
            Some(raw) => serde_json::from_str::<RateWindow>(&raw).ok(),
            None => None,
        };

        let (window, ttl) = match window.filter(|w| now <= w.reset_at) {
            Some(mut window) => {
                window.count += 1;
                let ttl = window.reset_at - now;
                (window, ttl)
            }
            None => (
                RateWindow {
                    count: 1,
                    reset_at: now + self.rate_window_seconds,
                },
                self.rate_window_seconds,
            ),
        };
        if ttl > 0 {
            if let Ok(raw) = serde_json::to_string(&window) {
                self.cache.set_ex(&key, &raw, ttl).await;
            }
        }
    }

    /// Drop the window after a success so earlier failures stop counting.
    pub async fn clear_failures(&self, purpose: OtpPurpose, identifier: &str) {
        let identifier = normalize(identifier);
        self.cache.del(&rate_key(purpose, &identifier)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn engine() -> OtpEngine {
        OtpEngine::new(Cache::memory())
    }

    /// Issue a code and capture it from the delivery closure.
    async fn request_code(engine: &OtpEngine, purpose: OtpPurpose, identifier: &str) -> String {
        let captured = Mutex::new(String::new());
        engine
            .request(purpose, identifier, |code| {
                captured
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push_str(code);
                Ok(())
            })
            .await
            .expect("request succeeds");
        let captured = captured
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        captured.clone()
    }

    #[test]
    fn code_format_check() {
        assert!(is_valid_code_format("123456"));
        assert!(!is_valid_code_format("12345"));
        assert!(!is_valid_code_format("1234567"));
        assert!(!is_valid_code_format("12345a"));
        assert!(!is_valid_code_format("12 456"));
        assert!(!is_valid_code_format(""));
    }

    #[test]
    fn email_masking() {
        assert_eq!(mask_email("jordan@example.com"), "jo****@example.com");
        assert_eq!(mask_email("ab@example.com"), "ab@example.com");
        assert_eq!(mask_email("a@example.com"), "a@example.com");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
        // Long locals never reveal their length.
        assert_eq!(
            mask_email("firstname.lastname@example.com"),
            "fi********@example.com"
        );
    }

    #[tokio::test]
    async fn issued_code_verifies() {
        let engine = engine();
        let code = request_code(&engine, OtpPurpose::PasswordReset, "User@Example.com").await;
        assert!(is_valid_code_format(&code));

        // Identifier is normalized, so case and whitespace do not matter.
        engine
            .verify(OtpPurpose::PasswordReset, " user@example.com ", &code)
            .await
            .expect("code verifies");
        // Verification does not consume.
        engine
            .verify(OtpPurpose::PasswordReset, "user@example.com", &code)
            .await
            .expect("still present");

        engine
            .consume(OtpPurpose::PasswordReset, "user@example.com")
            .await;
        assert!(matches!(
            engine
                .verify(OtpPurpose::PasswordReset, "user@example.com", &code)
                .await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn purposes_do_not_share_codes() {
        let engine = engine();
        let code = request_code(&engine, OtpPurpose::PasswordReset, "user@example.com").await;
        assert!(matches!(
            engine
                .verify(OtpPurpose::Registration, "user@example.com", &code)
                .await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn new_request_replaces_pending_code() {
        let engine = engine();
        let first = request_code(&engine, OtpPurpose::Registration, "user@example.com").await;
        let second = request_code(&engine, OtpPurpose::Registration, "user@example.com").await;
        if first != second {
            assert!(matches!(
                engine
                    .verify(OtpPurpose::Registration, "user@example.com", &first)
                    .await,
                Err(AuthError::OtpMismatch { .. })
            ));
        }
        engine
            .verify(OtpPurpose::Registration, "user@example.com", &second)
            .await
            .expect("latest code verifies");
    }

    #[tokio::test]
    async fn wrong_codes_burn_attempts_until_exhausted() {
        let engine = engine().with_max_attempts(3);
        let code = request_code(&engine, OtpPurpose::PasswordReset, "user@example.com").await;
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for expected_remaining in [2u32, 1, 0] {
            match engine
                .verify(OtpPurpose::PasswordReset, "user@example.com", wrong)
                .await
            {
                Err(AuthError::OtpMismatch { attempts_remaining }) => {
                    assert_eq!(attempts_remaining, expected_remaining);
                }
                other => panic!("expected mismatch, got {other:?}"),
            }
        }

        // The record is deleted on the exhausted check, after which it reads
        // as absent.
        assert!(matches!(
            engine
                .verify(OtpPurpose::PasswordReset, "user@example.com", &code)
                .await,
            Err(AuthError::OtpAttemptsExhausted)
        ));
        assert!(matches!(
            engine
                .verify(OtpPurpose::PasswordReset, "user@example.com", &code)
                .await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn store_outage_is_not_a_delivery_failure() {
        let engine = OtpEngine::new(Cache::disabled());
        let result = engine
            .request(OtpPurpose::PasswordReset, "user@example.com", |_| {
                panic!("delivery must not run when the code was never stored")
            })
            .await;
        assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn delivery_failure_rolls_back() {
        let engine = engine();
        let result = engine
            .request(OtpPurpose::PasswordReset, "user@example.com", |_| {
                anyhow::bail!("smtp down")
            })
            .await;
        assert!(matches!(result, Err(AuthError::DeliveryFailed)));
        assert!(matches!(
            engine
                .verify(OtpPurpose::PasswordReset, "user@example.com", "123456")
                .await,
            Err(AuthError::OtpNotFound)
        ));
    }

    #[tokio::test]
    async fn issuance_is_rate_limited() {
        let engine = engine().with_rate_limit(2, 900);
        request_code(&engine, OtpPurpose::PasswordReset, "user@example.com").await;
        request_code(&engine, OtpPurpose::PasswordReset, "user@example.com").await;

        let result = engine
            .request(OtpPurpose::PasswordReset, "user@example.com", |_| Ok(()))
            .await;
        match result {
            Err(AuthError::RateLimited {
                retry_after_seconds,
            }) => assert!(retry_after_seconds > 0 && retry_after_seconds <= 900),
            other => panic!("expected rate limit, got {other:?}"),
        }

        // A different identifier is unaffected.
        request_code(&engine, OtpPurpose::PasswordReset, "other@example.com").await;
    }

    #[tokio::test]
    async fn login_lockout_counts_failures() {
        let engine = engine().with_rate_limit(3, 900);
        let ip = "203.0.113.9";

        assert!(engine.is_limited(OtpPurpose::Login, ip).await.is_none());
        for _ in 0..3 {
            engine.record_failure(OtpPurpose::Login, ip).await;
        }
        assert!(engine.is_limited(OtpPurpose::Login, ip).await.is_some());

        engine.clear_failures(OtpPurpose::Login, ip).await;
        assert!(engine.is_limited(OtpPurpose::Login, ip).await.is_none());
    }

    #[tokio::test]
    async fn missing_code_reports_not_found() {
        let engine = engine();
        assert!(matches!(
            engine
                .verify(OtpPurpose::PasswordReset, "nobody@example.com", "123456")
                .await,
            Err(AuthError::OtpNotFound)
        ));
    }
}
