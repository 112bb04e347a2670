//! Error taxonomy shared by the synchronizer, recorder, and query engine.
//!
//! Each variant names a failure *kind*; whether the overall operation fails
//! or degrades is decided by the component that observes it:
//!
//! | Kind | Raised by | Effect |
//! |------|-----------|--------|
//! | `Fetch` | catalog fetch | aborts the synchronization run |
//! | `Resolution` | geolocation lookup | visit is still recorded, without geodata |
//! | `Write` | store upsert/insert | per-record during sync, fatal for a visit |
//! | `Query` | store read | fatal for the query |
//! | `Validation` | request input | rejected before touching the store |

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("catalog fetch failed: {0}")]
    Fetch(String),

    #[error("geolocation lookup failed: {0}")]
    Resolution(String),

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("invalid request: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn fetch(err: impl Display) -> Self {
        Self::Fetch(err.to_string())
    }

    pub fn resolution(err: impl Display) -> Self {
        Self::Resolution(err.to_string())
    }

    pub fn write(err: impl Display) -> Self {
        Self::Write(err.to_string())
    }

    pub fn query(err: impl Display) -> Self {
        Self::Query(err.to_string())
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Resolution(_) => "resolution",
            Self::Write(_) => "write",
            Self::Query(_) => "query",
            Self::Validation(_) => "validation",
        }
    }

    /// True for failures caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
