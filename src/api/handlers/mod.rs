//! API handlers for the Kalibro authentication service.

pub mod auth;
pub mod health;
pub mod root;
