//! Auth configuration and state assembly.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::auth::blacklist::Blacklist;
use crate::auth::gate::AuthState;
use crate::auth::otp::OtpEngine;
use crate::auth::session::SessionStore;
use crate::auth::token::TokenCodec;
use crate::cache::Cache;
use crate::email::EmailSender;

const ISSUER: &str = "kalibro-library";
const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RATE_LIMIT: u32 = 5;
const DEFAULT_RATE_WINDOW_SECONDS: i64 = 15 * 60;
const ACCESS_COOKIE_NAME: &str = "kalibro_token";
const REFRESH_COOKIE_NAME: &str = "kalibro_refresh_token";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    otp_max_attempts: u32,
    rate_limit: u32,
    rate_window_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window_seconds: DEFAULT_RATE_WINDOW_SECONDS,
        }
    }

    #[must_use]
    pub const fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_otp_max_attempts(mut self, attempts: u32) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, limit: u32, window_seconds: i64) -> Self {
        self.rate_limit = limit;
        self.rate_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    /// Assemble the runtime auth state from this configuration.
    #[must_use]
    pub fn build_state(
        &self,
        cache: Cache,
        mailer: Arc<dyn EmailSender>,
        access_secret: &SecretString,
        refresh_secret: &SecretString,
    ) -> AuthState {
        let codec = TokenCodec::new(
            access_secret.expose_secret().as_bytes(),
            refresh_secret.expose_secret().as_bytes(),
            ISSUER.to_string(),
            self.access_ttl_seconds,
            self.refresh_ttl_seconds,
        );
        let sessions = SessionStore::new(cache.clone(), self.refresh_ttl_seconds);
        let blacklist = Blacklist::new(cache.clone());
        let otp = OtpEngine::new(cache)
            .with_code_ttl_seconds(self.otp_ttl_seconds)
            .with_max_attempts(self.otp_max_attempts)
            .with_rate_limit(self.rate_limit, self.rate_window_seconds);
        AuthState::new(codec, sessions, blacklist, otp, mailer).with_cookie_names(
            ACCESS_COOKIE_NAME.to_string(),
            REFRESH_COOKIE_NAME.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::LogEmailSender;

    #[test]
    fn cookie_secure_follows_frontend_scheme() {
        assert!(AuthConfig::new("https://kalibro.dev".to_string()).cookie_secure());
        assert!(!AuthConfig::new("http://localhost:5173".to_string()).cookie_secure());
    }

    #[test]
    fn build_state_uses_configured_ttls() {
        let config = AuthConfig::new("http://localhost:5173".to_string())
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(120);
        let state = config.build_state(
            Cache::memory(),
            Arc::new(LogEmailSender),
            &SecretString::from("access-secret".to_string()),
            &SecretString::from("refresh-secret".to_string()),
        );
        assert_eq!(state.access_cookie_name(), "kalibro_token");
        assert_eq!(state.refresh_cookie_name(), "kalibro_refresh_token");
    }
}
