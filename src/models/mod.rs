//! Core data models for the photo delivery service.
//!
//! These entities map cleanly to database tables via `sqlx::FromRow` and
//! serialize as camelCase JSON via `serde`.

pub mod album;
pub mod client;
pub mod photo;
pub mod photographer;
