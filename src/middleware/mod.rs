pub mod auth;
pub mod trigger_auth;
