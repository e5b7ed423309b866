//! Navigation context for the current page view.
//!
//! Embedded apps receive their session credential and exit-redirect target
//! through query-string parameters on the page URL. This module models that
//! URL state as an explicit [`NavContext`] value so that everything derived
//! from it (credentials, redirect targets) is a pure function of an injected
//! input rather than a hidden read of ambient browser state.
//!
//! # Overview
//!
//! - [`NavContext`]: the host and query string of the current page
//! - [`LocationSource`]: trait for components that need the context
//!   re-evaluated at call time (the page context may change between calls)
//! - [`StaticLocation`]: a fixed-value source for tests and one-shot tools
//!
//! # Examples
//!
//! ```
//! use gangway_common::NavContext;
//!
//! let nav = NavContext::new("shop.example", "?session=tok_123&embedded=1");
//!
//! assert_eq!(nav.host(), "shop.example");
//! assert_eq!(nav.query_param("embedded").as_deref(), Some("1"));
//! assert!(nav.session_credential().is_some());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::credential::SessionCredential;

/// Query parameter carrying the platform-issued ID token.
pub const ID_TOKEN_PARAM: &str = "id_token";
/// Query parameter carrying the fallback session token.
pub const SESSION_PARAM: &str = "session";
/// Query parameter carrying the frame-exit redirect target.
pub const REDIRECT_URI_PARAM: &str = "redirectUri";

/// The navigation context of the current page view.
///
/// Holds the document host and the raw query string. All parameter lookups
/// are pure functions of this value, which makes credential extraction and
/// redirect validation testable without a real browser navigation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavContext {
    host: String,
    search: String,
}

impl NavContext {
    /// Creates a navigation context from the document host and query string.
    ///
    /// A leading `?` on the query string is accepted and stripped.
    ///
    /// # Arguments
    ///
    /// * `host` - The current document's host (e.g. `shop.example`)
    /// * `search` - The page URL's query string, with or without leading `?`
    pub fn new(host: impl Into<String>, search: impl Into<String>) -> Self {
        let search = search.into();
        let search = search.strip_prefix('?').unwrap_or(&search).to_owned();
        Self {
            host: host.into(),
            search,
        }
    }

    /// The current document's host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The raw query string, without a leading `?`.
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Looks up the first occurrence of a query parameter.
    ///
    /// Values are percent-decoded by the form parser. Returns `None` when the
    /// parameter is absent; an empty value is returned as `Some("")` and left
    /// for callers to interpret.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        form_urlencoded::parse(self.search.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Derives the session credential from the query string.
    ///
    /// `id_token` takes precedence over `session` when both are present.
    /// Empty parameter values are treated as absent, so a URL like
    /// `?id_token=&session=tok` still yields the `session` credential.
    /// Returns `None` when neither parameter carries a value; that is a
    /// valid state, not an error, and requests simply go out unauthenticated.
    #[must_use]
    pub fn session_credential(&self) -> Option<SessionCredential> {
        self.query_param(ID_TOKEN_PARAM)
            .filter(|token| !token.is_empty())
            .or_else(|| {
                self.query_param(SESSION_PARAM)
                    .filter(|token| !token.is_empty())
            })
            .map(SessionCredential::new)
    }

    /// The raw frame-exit redirect target, if present.
    ///
    /// The value is returned exactly as the form parser yields it; the exit
    /// controller applies its own additional percent-decoding pass before
    /// parsing, matching how the platform double-encodes the parameter.
    #[must_use]
    pub fn redirect_target(&self) -> Option<String> {
        self.query_param(REDIRECT_URI_PARAM)
    }
}

/// Source of the current navigation context.
///
/// The query client re-derives the credential on every request, so it holds
/// a `LocationSource` rather than a captured [`NavContext`]. Implementations
/// must return the context as of the call, not a cached copy.
pub trait LocationSource: Send + Sync {
    /// Returns the navigation context at the time of the call.
    fn current(&self) -> NavContext;
}

/// A [`LocationSource`] that always returns the same context.
///
/// Useful in tests and in tools that run outside a live page view.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    nav: NavContext,
}

impl StaticLocation {
    /// Creates a source pinned to the given context.
    #[must_use]
    pub const fn new(nav: NavContext) -> Self {
        Self { nav }
    }

    /// Convenience constructor returning the source already shared.
    #[must_use]
    pub fn shared(nav: NavContext) -> Arc<dyn LocationSource> {
        Arc::new(Self::new(nav))
    }
}

impl LocationSource for StaticLocation {
    fn current(&self) -> NavContext {
        self.nav.clone()
    }
}
