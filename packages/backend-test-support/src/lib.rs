//! Shared helpers for backend tests: logging bootstrap, throwaway SQLite
//! databases, and assertions over the JSON error contract.

pub mod error_body;
pub mod logging;
pub mod temp_db;

pub use error_body::{assert_error_body, ErrorBodyLike};
pub use temp_db::TempSqlite;
