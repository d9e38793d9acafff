//! Transport-level failures shared by every partner client.

use thiserror::Error;

/// Failure to obtain a partner response at all (as opposed to a response carrying a
/// rejection code).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("partner call timed out")]
    Timeout,

    #[error("partner unavailable: {0}")]
    Unavailable(String),

    /// The partner answered with something that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}
