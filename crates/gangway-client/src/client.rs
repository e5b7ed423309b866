//! The authenticated query client.
//!
//! # Request lifecycle
//!
//! Every fetch goes through the same pipeline:
//!
//! 1. **Credential derivation**: the client asks its [`LocationSource`] for
//!    the navigation context *at call time* and derives the `Authorization`
//!    header from it. Nothing is cached across requests; the page context
//!    may change between calls.
//! 2. **Request construction**: the derived auth header goes in first,
//!    caller-supplied headers are layered on top. A caller that sets its own
//!    `Authorization` intentionally overrides the derived one; caller headers
//!    are never silently dropped.
//! 3. **Timeout**: each attempt is bounded by the client timeout (10 seconds
//!    unless configured otherwise). Expiry aborts the in-flight request and
//!    fails with [`QueryError::Timeout`].
//! 4. **Validation**: non-success statuses become [`QueryError::Http`] with
//!    the body read as text; success bodies are parsed as JSON, with parse
//!    failures reported as [`QueryError::Decode`].
//! 5. **Caching**: resolved values land in the keyed store, deduplicated
//!    single-flight per key, fresh for the policy's stale window, retained
//!    for the retention window after last use.
//!
//! # Examples
//!
//! ```no_run
//! use gangway_client::{ClientConfig, QueryClient, QueryRequest};
//! use gangway_common::{NavContext, StaticLocation};
//!
//! # async fn example() -> Result<(), gangway_client::QueryError> {
//! let location = StaticLocation::shared(NavContext::new(
//!     "shop.example",
//!     "?id_token=abc123",
//! ));
//! let client = QueryClient::new(
//!     ClientConfig::default().with_base_url("https://shop.example"),
//!     location,
//! )?;
//!
//! let mut handle = client.query(QueryRequest::new("/api/products/count"));
//! let snapshot = handle.settled().await;
//! if let Some(value) = snapshot.data {
//!     println!("count: {value}");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use gangway_common::{LocationSource, QueryPolicy};

use crate::error::QueryError;
use crate::handle::QueryHandle;
use crate::request::QueryRequest;
use crate::store::QueryStore;

/// Client-side bound on every request attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Configuration for a [`QueryClient`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gangway_client::ClientConfig;
/// use gangway_common::QueryPolicy;
///
/// let config = ClientConfig::default()
///     .with_base_url("https://shop.example")
///     .with_timeout(Duration::from_secs(10))
///     .with_default_policy(QueryPolicy::default());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL that relative resource locators are resolved against.
    pub base_url: Option<String>,
    /// Per-attempt request bound.
    pub timeout: Duration,
    /// Policy applied to queries that carry no override.
    pub default_policy: QueryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            default_policy: QueryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Sets the base URL for relative locators.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default query policy.
    #[must_use]
    pub fn with_default_policy(mut self, policy: QueryPolicy) -> Self {
        self.default_policy = policy;
        self
    }
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    location: Arc<dyn LocationSource>,
    store: QueryStore,
}

/// Authenticated, cached, deduplicating query client.
///
/// Cheap to clone; clones share one cache. Spawning revalidation requires a
/// Tokio runtime, so [`query`](Self::query) must be called from within one.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a client from a configuration and a location source.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Request`] if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        location: Arc<dyn LocationSource>,
    ) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QueryError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                location,
                store: QueryStore::new(),
            }),
        })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribes to a query and kicks off revalidation in the background.
    ///
    /// The handle is returned immediately; observers watch the loading flag
    /// and data/error fields settle through it. Entries already fresh within
    /// the stale window resolve without a network round trip.
    #[must_use]
    pub fn query(&self, request: QueryRequest) -> QueryHandle {
        let policy = self.policy_for(&request);
        let (_entry, rx, guard) = self.inner.store.subscribe(&request, &policy);

        let client = self.clone();
        let background = request.clone();
        tokio::spawn(async move {
            if let Err(error) = client.fetch(&background).await {
                debug!("background revalidation of '{}' failed: {error}", background.url);
            }
        });

        QueryHandle::new(self.clone(), request, rx, guard)
    }

    /// Resolves a query through the shared cache.
    ///
    /// Values fresh within the stale window are served without network I/O.
    /// Concurrent calls for one key share a single underlying request.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`QueryError`] once retries are exhausted.
    pub async fn fetch(&self, request: &QueryRequest) -> Result<Arc<Value>, QueryError> {
        self.fetch_inner(request, false).await
    }

    /// Resolves a query, bypassing freshness.
    ///
    /// Still goes through credential derivation, timeout, and retry, and the
    /// resolved value updates the shared entry observed by all subscribers.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`QueryError`] once retries are exhausted.
    pub async fn refetch(&self, request: &QueryRequest) -> Result<Arc<Value>, QueryError> {
        self.fetch_inner(request, true).await
    }

    /// Performs a one-shot authenticated request outside the cache.
    ///
    /// Imperative actions (create, populate) use this: same credential,
    /// timeout, and validation pipeline, but no entry is written.
    ///
    /// # Errors
    ///
    /// Returns the [`QueryError`] for the single attempt; no retries.
    pub async fn execute(&self, request: &QueryRequest) -> Result<Value, QueryError> {
        self.execute_once(request).await
    }

    /// Revalidates subscribed queries that opted into focus refetching.
    ///
    /// The default policy opts out, so this is a no-op unless a query asked
    /// for it explicitly.
    pub fn notify_focus(&self) {
        for request in self.inner.store.focus_candidates() {
            let client = self.clone();
            tokio::spawn(async move {
                if let Err(error) = client.refetch(&request).await {
                    warn!("focus revalidation of '{}' failed: {error}", request.url);
                }
            });
        }
    }

    /// Drops unused cache entries past their retention window.
    ///
    /// Sweeping also happens opportunistically on access; this is for hosts
    /// that want an explicit hook.
    pub fn collect_garbage(&self) {
        self.inner.store.sweep();
    }

    pub(crate) fn policy_for(&self, request: &QueryRequest) -> QueryPolicy {
        request
            .policy
            .clone()
            .unwrap_or_else(|| self.inner.config.default_policy.clone())
    }

    async fn fetch_inner(
        &self,
        request: &QueryRequest,
        force: bool,
    ) -> Result<Arc<Value>, QueryError> {
        let policy = self.policy_for(request);
        let entry = self.inner.store.entry(request, &policy);

        if !force && let Some(value) = entry.fresh_value(policy.stale_window) {
            return Ok(value);
        }

        let slot = entry.acquire_slot().await;
        // A fetch that completed while we waited for the slot satisfies a
        // non-forced call; forced calls contend for the slot and go out anyway.
        if !force && let Some(value) = entry.fresh_value(policy.stale_window) {
            return Ok(value);
        }

        entry.begin_loading();
        let outcome = self.run_with_retry(request, &policy).await;
        entry.complete(&outcome);
        drop(slot);
        outcome
    }

    async fn run_with_retry(
        &self,
        request: &QueryRequest,
        policy: &QueryPolicy,
    ) -> Result<Arc<Value>, QueryError> {
        let mut last_error = QueryError::Request(format!("'{}' was never attempted", request.url));

        for attempt in 0..=policy.retry_count {
            match self.execute_once(request).await {
                Ok(value) => return Ok(Arc::new(value)),
                Err(error) => {
                    if attempt < policy.retry_count && error.is_retryable() {
                        debug!(
                            "query '{}' failed (attempt {}), retrying in {RETRY_DELAY:?}: {error}",
                            request.url,
                            attempt + 1,
                        );
                        last_error = error;
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                    last_error = error;
                    break;
                }
            }
        }

        warn!("query '{}' failed: {last_error}", request.url);
        Err(last_error)
    }

    async fn execute_once(&self, request: &QueryRequest) -> Result<Value, QueryError> {
        let url = self.resolve_url(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| QueryError::Request(format!("invalid method '{}'", request.method)))?;

        let mut builder = self
            .inner
            .http
            .request(method, url)
            .headers(self.build_headers(request)?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let attempt = async {
            let response = builder.send().await.map_err(|e| QueryError::from_reqwest(&e))?;
            let status = response.status();

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .map_err(|e| QueryError::from_reqwest(&e))?;
                return Err(QueryError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let text = response
                .text()
                .await
                .map_err(|e| QueryError::from_reqwest(&e))?;
            serde_json::from_str(&text).map_err(|e| QueryError::Decode(e.to_string()))
        };

        match tokio::time::timeout(self.inner.config.timeout, attempt).await {
            Ok(result) => result,
            Err(_elapsed) => Err(QueryError::Timeout),
        }
    }

    /// Builds the request headers: derived auth first, caller overrides on top.
    fn build_headers(&self, request: &QueryRequest) -> Result<HeaderMap, QueryError> {
        let mut headers = HeaderMap::new();

        if let Some(credential) = self.inner.location.current().session_credential() {
            let mut value = HeaderValue::from_str(&credential.authorization_value())
                .map_err(|_| QueryError::Request("credential is not a legal header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| QueryError::Request(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| QueryError::Request(format!("invalid value for header '{name}'")))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, QueryError> {
        if let Ok(url) = Url::parse(raw) {
            return Ok(url);
        }
        let base = self.inner.config.base_url.as_deref().ok_or_else(|| {
            QueryError::Request(format!("relative locator '{raw}' requires a base URL"))
        })?;
        let base = Url::parse(base)
            .map_err(|e| QueryError::Request(format!("invalid base URL '{base}': {e}")))?;
        base.join(raw)
            .map_err(|e| QueryError::Request(format!("cannot resolve locator '{raw}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use gangway_common::{NavContext, StaticLocation};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, search: &str) -> QueryClient {
        let location = StaticLocation::shared(NavContext::new("shop.example", search));
        QueryClient::new(
            ClientConfig::default().with_base_url(server.uri()),
            location,
        )
        .unwrap()
    }

    fn no_retry() -> QueryPolicy {
        QueryPolicy::default().with_retry_count(0)
    }

    #[tokio::test]
    async fn attaches_bearer_from_id_token_over_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .and(header("authorization", "Bearer idtok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "?id_token=idtok&session=sess");
        let value = client
            .fetch(&QueryRequest::new("/api/products/count").with_policy(no_retry()))
            .await
            .unwrap();

        assert_eq!(value["count"], 5);
    }

    #[tokio::test]
    async fn omits_authorization_without_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = test_client(&server, "?embedded=1");
        client
            .fetch(&QueryRequest::new("/api/products/count").with_policy(no_retry()))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn caller_authorization_overrides_derived_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/custom"))
            .and(header("authorization", "Bearer custom"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "?id_token=derived");
        let request = QueryRequest::new("/api/custom")
            .with_header("Authorization", "Bearer custom")
            .with_policy(no_retry());
        client.fetch(&request).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let values: Vec<_> = requests[0].headers.get_all("authorization").iter().collect();
        assert_eq!(values.len(), 1);
    }

    #[tokio::test]
    async fn timeout_is_distinct_and_clears_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let location = StaticLocation::shared(NavContext::new("shop.example", ""));
        let client = QueryClient::new(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_timeout(Duration::from_millis(100)),
            location,
        )
        .unwrap();

        let mut handle = client.query(QueryRequest::new("/api/slow").with_policy(no_retry()));
        let snapshot = handle.settled().await;

        assert_eq!(snapshot.error, Some(QueryError::Timeout));
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "count": 2 }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "?session=tok");
        let request = QueryRequest::new("/api/products/count").with_policy(no_retry());

        let (a, b) = tokio::join!(client.fetch(&request), client.fetch(&request));
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(*a, *b);
        assert_eq!(a["count"], 2);
    }

    #[tokio::test]
    async fn http_error_carries_status_and_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/broken"))
            .respond_with(ResponseTemplate::new(418).set_body_string("short and stout"))
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let error = client
            .fetch(&QueryRequest::new("/api/broken").with_policy(no_retry()))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            QueryError::Http {
                status: 418,
                body: "short and stout".into()
            }
        );
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let value = client
            .fetch(&QueryRequest::new("/api/flaky"))
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn surfaces_error_after_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/down"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let error = client
            .fetch(&QueryRequest::new("/api/down"))
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(500));
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let error = client
            .fetch(&QueryRequest::new("/api/garbled"))
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::Decode(_)));
    }

    #[tokio::test]
    async fn fresh_value_served_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "count": 7 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let request = QueryRequest::new("/api/products/count").with_policy(no_retry());
        let first = client.fetch(&request).await.unwrap();
        let second = client.fetch(&request).await.unwrap();

        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn refetch_updates_all_subscribers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "count": 1 })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/products/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "count": 6 })))
            .mount(&server)
            .await;

        let client = test_client(&server, "?session=tok");
        let request = QueryRequest::new("/api/products/count").with_policy(no_retry());

        let mut first = client.query(request.clone());
        first.settled().await;
        let second = client.query(request.clone());

        let refreshed = first.refetch().await.unwrap();
        assert_eq!(refreshed["count"], 6);
        assert_eq!(second.data().unwrap()["count"], 6);
    }

    #[tokio::test]
    async fn changed_descriptor_invalidates_cached_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "n": 1 })))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        client
            .fetch(&QueryRequest::new("/api/items").with_policy(no_retry()))
            .await
            .unwrap();
        client
            .fetch(
                &QueryRequest::new("/api/items")
                    .with_header("X-Page", "2")
                    .with_policy(no_retry()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn focus_revalidates_only_opted_in_queries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "v": 1 })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "v": 2 })))
            .mount(&server)
            .await;

        let client = test_client(&server, "");
        let request = QueryRequest::new("/api/live")
            .with_policy(no_retry().with_refetch_on_focus(true));

        let mut handle = client.query(request);
        handle.settled().await;
        assert_eq!(handle.data().unwrap()["v"], 1);

        client.notify_focus();
        let updated = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if handle.data().is_some_and(|value| value["v"] == 2) {
                    break;
                }
                if !handle.changed().await {
                    break;
                }
            }
        })
        .await;
        assert!(updated.is_ok());
        assert_eq!(handle.data().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn relative_locator_requires_base_url() {
        let location = StaticLocation::shared(NavContext::new("shop.example", ""));
        let client = QueryClient::new(ClientConfig::default(), location).unwrap();

        let error = client
            .fetch(&QueryRequest::new("/api/anything"))
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Request(_)));
    }
}
