//! Cache and retry policy for queries.
//!
//! Retry counts and cache windows were historically scattered across call
//! sites; this module hoists them into one structure with central defaults
//! so every query names its policy explicitly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Controls retry behavior and cache lifetime for a single query.
///
/// Host applications typically rely on [`QueryPolicy::default`] and override
/// individual knobs per query.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gangway_common::QueryPolicy;
///
/// let policy = QueryPolicy::default()
///     .with_retry_count(2)
///     .with_stale_window(Duration::from_secs(60));
///
/// assert_eq!(policy.retry_count, 2);
/// assert!(!policy.refetch_on_focus);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPolicy {
    /// Retries attempted after a failed fetch before the error surfaces.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// How long a resolved value counts as fresh and is served without a
    /// network round trip.
    #[serde(default = "default_stale_window")]
    pub stale_window: Duration,
    /// How long an unused entry is retained after its last subscriber goes
    /// away before it becomes eligible for eviction.
    #[serde(default = "default_retention_window")]
    pub retention_window: Duration,
    /// Whether regaining window focus triggers a revalidation.
    ///
    /// Off by default: the hosting shell regains focus constantly as users
    /// move between the embedded frame and the surrounding admin surface.
    #[serde(default)]
    pub refetch_on_focus: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            stale_window: default_stale_window(),
            retention_window: default_retention_window(),
            refetch_on_focus: false,
        }
    }
}

const fn default_retry_count() -> u32 {
    1
}

const fn default_stale_window() -> Duration {
    Duration::from_secs(30)
}

const fn default_retention_window() -> Duration {
    Duration::from_secs(5 * 60)
}

impl QueryPolicy {
    /// Sets the retry count.
    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the freshness window.
    #[must_use]
    pub const fn with_stale_window(mut self, stale_window: Duration) -> Self {
        self.stale_window = stale_window;
        self
    }

    /// Sets the retention window.
    #[must_use]
    pub const fn with_retention_window(mut self, retention_window: Duration) -> Self {
        self.retention_window = retention_window;
        self
    }

    /// Enables or disables revalidation on window focus.
    #[must_use]
    pub const fn with_refetch_on_focus(mut self, refetch_on_focus: bool) -> Self {
        self.refetch_on_focus = refetch_on_focus;
        self
    }
}
