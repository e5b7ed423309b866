//! Error types for the query client.

use thiserror::Error;

/// Errors that can occur while resolving a query.
///
/// Every variant is `Clone` because resolved outcomes are fanned out to all
/// subscribers of a cache entry, not handed to a single caller.
///
/// Credential absence is deliberately not represented here: a request issued
/// without a platform credential is a valid state and simply goes out without
/// an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The request exceeded the client-side time bound.
    ///
    /// The in-flight request is aborted when the bound expires, so this is
    /// distinguishable from a server-reported failure.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    ///
    /// The body is read as text rather than assumed to be JSON, since error
    /// bodies frequently are not.
    #[error("HTTP error: status {status}")]
    Http {
        /// The response status code.
        status: u16,
        /// The raw response body text.
        body: String,
    },

    /// A success response carried a body that failed to parse as JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request failed below the HTTP layer (DNS, connect, socket).
    #[error("network error: {0}")]
    Network(String),

    /// The descriptor could not be turned into a request.
    ///
    /// Invalid method names, unparseable locators, or header values that are
    /// not legal HTTP land here before anything is sent.
    #[error("invalid request: {0}")]
    Request(String),
}

impl QueryError {
    /// Check if this error is eligible for a retry attempt.
    ///
    /// Timeouts, HTTP-status failures, and network failures are retried up to
    /// the policy's count; decode failures and malformed descriptors are
    /// deterministic and are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Http { .. } | Self::Network(_)
        )
    }

    /// The HTTP status code, when the server reported one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The raw response body, when the server reported a failure.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Maps a transport error onto the taxonomy.
    pub(crate) fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error.to_string())
        }
    }
}
