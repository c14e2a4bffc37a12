//! # Kalibro (Library Management Authentication Core)
//!
//! `kalibro` is the authentication and session core of the Kalibro library
//! management system. It issues and verifies JWT access/refresh token pairs,
//! tracks per-device sessions in Redis, maintains a revocation blacklist, and
//! runs the OTP flows behind password reset and registration.
//!
//! ## Tokens
//!
//! Access tokens (15 minutes) and refresh tokens (7 days) are HS256 JWTs
//! signed with independent secrets. Refresh tokens can only mint new access
//! tokens; they never authorize API calls directly.
//!
//! ## Sessions & Revocation
//!
//! Each login creates a session record keyed by a 256-bit random id, holding
//! SHA-256 fingerprints of both tokens plus device metadata. Logout parks the
//! raw tokens on a blacklist for their remaining lifetime, so revocation
//! holds even while the signature is still valid.
//!
//! ## Degradation
//!
//! A Redis outage degrades session bookkeeping and revocation to logged
//! no-ops rather than taking logins down. OTP issuance and verification are
//! the exception: their failures surface verbatim, because silently skipping
//! a throttle would disable brute force protection.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod email;
