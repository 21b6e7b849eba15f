//! Failure categories for the Sauce Bottle backend.
//!
//! Every error raised by the core carries exactly one of these kinds. The
//! string form is SCREAMING_SNAKE_CASE and is what appears in the `error`
//! field of HTTP error bodies.

use core::fmt;

/// Closed set of failure categories.
///
/// The HTTP status attached to each kind is advisory: the core never depends
/// on it, transports use it to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// The operation would violate a uniqueness constraint.
    Conflict,
    /// Caller-supplied data is malformed or violates an integrity rule.
    InvalidInput,
    /// The storage engine cannot be reached or did not answer a liveness probe.
    StorageUnavailable,
    /// Acquiring a connection or running an operation exceeded its deadline.
    StorageTimeout,
    /// Anything else. Never carries caller-visible details.
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::InvalidInput,
        ErrorKind::StorageUnavailable,
        ErrorKind::StorageTimeout,
        ErrorKind::Internal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::InvalidInput => "INVALID_INPUT",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::StorageTimeout => "STORAGE_TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Advisory HTTP status for this kind.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InvalidInput => 400,
            Self::StorageUnavailable => 503,
            Self::StorageTimeout => 504,
            Self::Internal => 500,
        }
    }

    /// Storage failures are the only ones a retry can plausibly fix.
    pub const fn is_storage(self) -> bool {
        matches!(self, Self::StorageUnavailable | Self::StorageTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn kind_strings_are_unique_screaming_snake() {
        let mut seen = HashSet::new();
        for kind in ErrorKind::ALL {
            let s = kind.as_str();
            assert!(seen.insert(s), "duplicate kind string {s}");
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn advisory_statuses() {
        let statuses: Vec<u16> = ErrorKind::ALL.iter().map(|k| k.http_status()).collect();
        assert_eq!(statuses, vec![404, 409, 400, 503, 504, 500]);
    }

    #[test]
    fn only_storage_kinds_are_storage() {
        assert!(ErrorKind::StorageTimeout.is_storage());
        assert!(ErrorKind::StorageUnavailable.is_storage());
        assert!(!ErrorKind::Internal.is_storage());
        assert!(!ErrorKind::Conflict.is_storage());
    }
}
