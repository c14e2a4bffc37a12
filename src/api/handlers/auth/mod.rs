//! Authentication endpoints: login, refresh, logout, profile, sessions, and
//! the OTP-backed password reset and registration flows.

pub mod login;
pub mod logout;
pub mod me;
pub mod password;
pub mod refresh;
pub mod register;
pub mod sessions;
pub mod state;
pub mod types;
mod utils;

pub use state::AuthConfig;
