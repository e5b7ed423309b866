//! Result handles for queries.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::request::QueryRequest;
use crate::store::{QuerySnapshot, SubscriberGuard};

/// A live, read-only view of one cache entry.
///
/// Handles observe the entry through a watch channel: `data`, `is_loading`,
/// and `error` always reflect the latest resolution, shared with every other
/// handle for the same locator. Dropping the handle unsubscribes; the entry
/// then ages out after its retention window.
///
/// Handles never write the cache themselves; [`refetch`](Self::refetch)
/// routes through the client's resolution path like any other fetch.
pub struct QueryHandle {
    client: QueryClient,
    request: QueryRequest,
    rx: watch::Receiver<QuerySnapshot>,
    _guard: SubscriberGuard,
}

impl QueryHandle {
    pub(crate) fn new(
        client: QueryClient,
        request: QueryRequest,
        rx: watch::Receiver<QuerySnapshot>,
        guard: SubscriberGuard,
    ) -> Self {
        Self {
            client,
            request,
            rx,
            _guard: guard,
        }
    }

    /// The descriptor this handle was created from.
    #[must_use]
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// The current point-in-time view of the entry.
    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot {
        self.rx.borrow().clone()
    }

    /// The last resolved value, if any.
    #[must_use]
    pub fn data(&self) -> Option<Arc<Value>> {
        self.rx.borrow().data.clone()
    }

    /// The last resolved value, deserialized into `T`.
    ///
    /// Returns `None` when there is no data yet or it does not fit `T`.
    #[must_use]
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.data()
            .and_then(|value| serde_json::from_value((*value).clone()).ok())
    }

    /// Whether a fetch for this entry is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.rx.borrow().is_loading
    }

    /// The error from the most recent resolution, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<QueryError> {
        self.rx.borrow().error.clone()
    }

    /// Waits for the next change to the entry.
    ///
    /// Returns `false` once the entry has been evicted and no further
    /// changes can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until the entry has resolved at least once and is not loading.
    ///
    /// Returns immediately when the entry has already settled (including
    /// settled-with-error).
    pub async fn settled(&mut self) -> QuerySnapshot {
        loop {
            let snapshot = self.rx.borrow_and_update().clone();
            if snapshot.has_settled() && !snapshot.is_loading {
                return snapshot;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }

    /// Forces a revalidation, bypassing freshness.
    ///
    /// The resolved value lands in the shared entry, so every other handle
    /// for this locator observes it too.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`QueryError`] once retries are exhausted.
    pub async fn refetch(&self) -> Result<Arc<Value>, QueryError> {
        self.client.refetch(&self.request).await
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("request", &self.request)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
