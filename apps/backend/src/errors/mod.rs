//! Error vocabulary shared by every layer of the backend.
//!
//! `ErrorKind` names the failure category, `DetailValue` carries the
//! structured context attached to a failure. The error type itself lives in
//! `crate::error`.

pub mod details;
pub mod error_code;

pub use details::{DetailValue, Details};
pub use error_code::ErrorKind;
