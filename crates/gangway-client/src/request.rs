//! Query descriptors.
//!
//! A [`QueryRequest`] names a backend resource plus the request-init and
//! policy overrides for fetching it. Descriptors are plain data: building one
//! performs no I/O, and an existing descriptor is never mutated; callers
//! build a new one when the locator or overrides change.
//!
//! Two identity notions matter here:
//!
//! - the **cache key** ([`QueryRequest::cache_key`]) is the resource locator;
//!   all descriptors for one locator share one cache entry
//! - the **fingerprint** ([`QueryRequest::fingerprint`]) is the serialized
//!   form of the locator plus request-init overrides; when it changes for a
//!   given key, the cached entry is invalidated and refetched
//!
//! Policy overrides are deliberately excluded from the fingerprint: tuning a
//! staleness window is not a different request.
//!
//! # Examples
//!
//! ```
//! use gangway_client::QueryRequest;
//! use gangway_common::QueryPolicy;
//!
//! let request = QueryRequest::new("/api/products/count")
//!     .with_policy(QueryPolicy::default().with_retry_count(1));
//!
//! assert_eq!(request.cache_key(), "/api/products/count");
//! ```

use serde::{Deserialize, Serialize};

use gangway_common::QueryPolicy;

use crate::error::QueryError;

/// A descriptor for a single backend query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The resource locator: an absolute URL or a path resolved against the
    /// client's base URL.
    pub url: String,
    /// The HTTP method name. Defaults to `GET`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Caller-supplied headers, layered over the derived auth header.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// An optional request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Per-query policy override. `None` uses the client default.
    #[serde(default)]
    pub policy: Option<QueryPolicy>,
}

fn default_method() -> String {
    "GET".to_owned()
}

impl QueryRequest {
    /// Creates a GET descriptor for the given locator.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: Vec::new(),
            body: None,
            policy: None,
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Adds a header.
    ///
    /// Caller-supplied headers are applied after the derived auth header, so
    /// supplying `Authorization` here intentionally overrides it.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a raw request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON request body and marks the content type.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Request`] if `value` cannot be serialized.
    pub fn with_json_body<T: Serialize>(self, value: &T) -> Result<Self, QueryError> {
        let body = serde_json::to_string(value)
            .map_err(|e| QueryError::Request(format!("unserializable body: {e}")))?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    /// Overrides the cache/retry policy for this query.
    #[must_use]
    pub fn with_policy(mut self, policy: QueryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The cache key for this descriptor.
    ///
    /// Entries are keyed by resource locator alone; see the module docs for
    /// how the fingerprint handles changed overrides under the same key.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.url
    }

    /// The serialized identity of this descriptor.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::json!({
            "method": self.method,
            "url": self.url,
            "headers": self.headers,
            "body": self.body,
        })
        .to_string()
    }
}
