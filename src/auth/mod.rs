//! Authentication core: tokens, sessions, revocation, one-time codes.
//!
//! The flow through a request: `gate` pulls a token off the request, `token`
//! verifies it, `blacklist` rules out revoked ones, `session` keeps the
//! per-device bookkeeping, and `otp` backs the password-reset and
//! registration flows. Everything persists through the cache adapter.

pub mod blacklist;
pub mod error;
pub mod gate;
pub mod otp;
pub mod session;
pub mod token;

pub use error::AuthError;
pub use gate::{AuthState, ClientMeta, TokenPair};
pub use token::{Claims, TokenCodec, TokenKind};
