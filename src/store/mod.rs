//! Persistence layer — libSQL-backed storage for users, sessions,
//! transcripts, and plans.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{NewUser, Store, TranscriptRecord, UserProfile};
