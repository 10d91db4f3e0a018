//! Error types for Depot client operations.
//!
//! Only misuse of the synchronous API is ever surfaced to callers: delivery
//! happens on a background task, so upload failures are contained there and
//! retried (see [`crate::retry`]) rather than propagated. The one error a
//! healthy program should expect to handle is [`ClientError::WriterClosed`].

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for Depot client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `write` was called on a writer after `close()`.
    ///
    /// The writer rejects new items as soon as close is requested; anything
    /// written before the close call is still delivered.
    #[error("writer for '{0}' is already closed")]
    WriterClosed(String),

    /// An item could not be serialized to a JSON line.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The base URL or a path joined onto it could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An HTTP request on the read path failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A read request returned a non-success status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, trailing whitespace stripped.
        body: String,
    },

    /// A streamed response body could not be read.
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    /// Internal error that shouldn't normally occur, e.g. the delivery loop
    /// panicked or exited before shutdown was requested.
    #[error("internal error: {0}")]
    Internal(String),
}
