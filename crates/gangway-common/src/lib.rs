//! # gangway-common
//!
//! Common types for applications embedded inside a hosting platform's iframe
//! shell.
//!
//! This crate provides the foundational types shared by the query client and
//! the frame-exit controller:
//! - Navigation context and credential extraction from the current page URL
//! - Per-query cache and retry policy
//! - The capability interface exposed by the hosting shell
//!
//! ## Example
//!
//! ```
//! use gangway_common::{NavContext, QueryPolicy};
//!
//! // The navigation context is an explicit value, never a hidden global read.
//! let nav = NavContext::new("shop.example", "?id_token=abc123&session=xyz");
//!
//! // `id_token` wins when both credential parameters are present.
//! let credential = nav.session_credential().unwrap();
//! assert_eq!(credential.authorization_value(), "Bearer abc123");
//!
//! // Policy knobs default centrally and can be overridden per query.
//! let policy = QueryPolicy::default().with_retry_count(2);
//! assert_eq!(policy.retry_count, 2);
//! ```

/// Session credential extracted from the navigation context.
///
/// Wraps the platform-issued bearer token so it cannot leak through logs.
pub mod credential;
/// Navigation context types.
///
/// Provides the current page's host and query string as an injected value,
/// plus the trait used to source it.
pub mod nav;
/// Cache and retry policy for queries.
pub mod policy;
/// Capability interface of the hosting shell.
pub mod shell;

pub use credential::SessionCredential;
pub use nav::{LocationSource, NavContext, StaticLocation};
pub use policy::QueryPolicy;
pub use shell::{ShellBridge, SharedShell};
