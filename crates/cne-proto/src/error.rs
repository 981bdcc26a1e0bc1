//! Protocol error types.

use thiserror::Error;

/// Record validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The endpoint URI is not an absolute http(s) URL.
    #[error("invalid endpoint uri {uri}: {reason}")]
    InvalidEndpoint { uri: String, reason: String },
}
