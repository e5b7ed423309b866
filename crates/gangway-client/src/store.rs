//! The keyed query store.
//!
//! One [`Entry`] per cache key holds the last-known value, the loading/error
//! status, and the timing metadata governing staleness and retention. The
//! shared-mutation discipline is strict: only the client's resolution path
//! writes entries; everything else observes read-only through
//! [`tokio::sync::watch`] receivers.
//!
//! Subscribers are reference-counted. An entry with live subscribers is never
//! evicted; once the last subscriber is dropped, the entry survives for its
//! policy's retention window and is then swept.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use tokio::sync::watch;

use gangway_common::QueryPolicy;

use crate::error::QueryError;
use crate::request::QueryRequest;

/// Locks a std mutex, recovering the guard if a writer panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A point-in-time view of a cache entry.
///
/// Snapshots are what subscribers observe; they carry no liveness and go
/// stale the moment the entry is written again.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    /// The last resolved value, if any. Kept through later failures so
    /// observers can keep rendering stale data next to the error.
    pub data: Option<Arc<Value>>,
    /// The error from the most recent resolution, if it failed.
    pub error: Option<QueryError>,
    /// Whether a fetch for this entry is currently in flight.
    pub is_loading: bool,
    /// Wall-clock time of the last successful resolution.
    pub updated_at: Option<DateTime<Utc>>,
    /// Monotonic time of the last successful resolution; governs staleness.
    resolved_at: Option<Instant>,
}

impl QuerySnapshot {
    /// Whether the snapshot holds a value fresh within `stale_window`.
    #[must_use]
    pub fn is_fresh(&self, stale_window: Duration) -> bool {
        self.data.is_some()
            && self.error.is_none()
            && self
                .resolved_at
                .is_some_and(|at| at.elapsed() < stale_window)
    }

    /// Whether the entry has resolved at least once, successfully or not.
    #[must_use]
    pub const fn has_settled(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }
}

struct EntryMeta {
    fingerprint: String,
    request: QueryRequest,
    policy: QueryPolicy,
    last_used: Instant,
}

pub(crate) struct Entry {
    tx: watch::Sender<QuerySnapshot>,
    /// Single-flight slot: the holder is the one task allowed to be fetching
    /// this key. Waiters re-check freshness after acquiring.
    slot: tokio::sync::Mutex<()>,
    subscribers: AtomicUsize,
    meta: Mutex<EntryMeta>,
}

impl Entry {
    fn new(request: &QueryRequest, policy: &QueryPolicy) -> Self {
        let (tx, _rx) = watch::channel(QuerySnapshot::default());
        Self {
            tx,
            slot: tokio::sync::Mutex::new(()),
            subscribers: AtomicUsize::new(0),
            meta: Mutex::new(EntryMeta {
                fingerprint: request.fingerprint(),
                request: request.clone(),
                policy: policy.clone(),
                last_used: Instant::now(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> QuerySnapshot {
        self.tx.borrow().clone()
    }

    /// Returns the cached value if it is fresh within `stale_window`.
    pub(crate) fn fresh_value(&self, stale_window: Duration) -> Option<Arc<Value>> {
        let snapshot = self.tx.borrow();
        if snapshot.is_fresh(stale_window) {
            snapshot.data.clone()
        } else {
            None
        }
    }

    pub(crate) async fn acquire_slot(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.slot.lock().await
    }

    pub(crate) fn begin_loading(&self) {
        self.tx.send_modify(|snapshot| snapshot.is_loading = true);
    }

    /// Writes a resolution into the entry.
    ///
    /// Unconditional overwrite: for a given key the most recently *completed*
    /// fetch wins, regardless of issue order.
    pub(crate) fn complete(&self, outcome: &Result<Arc<Value>, QueryError>) {
        self.tx.send_modify(|snapshot| {
            snapshot.is_loading = false;
            match outcome {
                Ok(value) => {
                    snapshot.data = Some(Arc::clone(value));
                    snapshot.error = None;
                    snapshot.updated_at = Some(Utc::now());
                    snapshot.resolved_at = Some(Instant::now());
                }
                Err(error) => {
                    snapshot.error = Some(error.clone());
                    snapshot.resolved_at = None;
                }
            }
        });
    }

    fn touch(&self) {
        lock(&self.meta).last_used = Instant::now();
    }
}

/// Decrements the entry's subscriber count when an observer goes away.
pub(crate) struct SubscriberGuard {
    entry: Arc<Entry>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.entry.subscribers.fetch_sub(1, Ordering::SeqCst);
        self.entry.touch();
    }
}

/// The keyed store owned by the query client.
pub(crate) struct QueryStore {
    entries: DashMap<String, Arc<Entry>>,
}

impl QueryStore {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Gets or creates the entry for a descriptor, reconciling identity.
    ///
    /// A descriptor whose fingerprint differs from the entry's recorded one
    /// invalidates the cached freshness, so the next fetch goes to the
    /// network even inside the stale window.
    pub(crate) fn entry(&self, request: &QueryRequest, policy: &QueryPolicy) -> Arc<Entry> {
        self.sweep();
        let entry = Arc::clone(
            &self
                .entries
                .entry(request.cache_key().to_owned())
                .or_insert_with(|| Arc::new(Entry::new(request, policy))),
        );

        let fingerprint = request.fingerprint();
        let mut meta = lock(&entry.meta);
        if meta.fingerprint != fingerprint {
            debug!(
                "descriptor changed for '{}', invalidating cached entry",
                request.cache_key()
            );
            meta.fingerprint = fingerprint;
            meta.request = request.clone();
            entry.tx.send_modify(|snapshot| snapshot.resolved_at = None);
        }
        meta.policy = policy.clone();
        meta.last_used = Instant::now();
        drop(meta);

        entry
    }

    /// Subscribes to a descriptor's entry.
    pub(crate) fn subscribe(
        &self,
        request: &QueryRequest,
        policy: &QueryPolicy,
    ) -> (Arc<Entry>, watch::Receiver<QuerySnapshot>, SubscriberGuard) {
        let entry = self.entry(request, policy);
        entry.subscribers.fetch_add(1, Ordering::SeqCst);
        let rx = entry.tx.subscribe();
        let guard = SubscriberGuard {
            entry: Arc::clone(&entry),
        };
        (entry, rx, guard)
    }

    /// Evicts unused entries past their retention window.
    pub(crate) fn sweep(&self) {
        self.entries.retain(|key, entry| {
            if entry.subscribers.load(Ordering::SeqCst) > 0 {
                return true;
            }
            let meta = lock(&entry.meta);
            let keep = meta.last_used.elapsed() < meta.policy.retention_window;
            if !keep {
                debug!("evicting idle cache entry '{key}'");
            }
            keep
        });
    }

    /// Descriptors to revalidate when the window regains focus.
    ///
    /// Only subscribed entries whose policy opted in are returned; the
    /// default policy opts out.
    pub(crate) fn focus_candidates(&self) -> Vec<QueryRequest> {
        self.entries
            .iter()
            .filter_map(|kv| {
                let entry = kv.value();
                if entry.subscribers.load(Ordering::SeqCst) == 0 {
                    return None;
                }
                let meta = lock(&entry.meta);
                meta.policy
                    .refetch_on_focus
                    .then(|| meta.request.clone())
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
