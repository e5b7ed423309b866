//! # gangway-client
//!
//! Authenticated, cached, deduplicating query client for apps embedded in a
//! hosting platform's iframe shell.
//!
//! The client attaches the platform-issued session credential to every
//! outbound request, bounds each attempt to a timeout, validates and decodes
//! responses, and caches results in a keyed store with single-flight dedup,
//! staleness, and retention windows. UI layers observe results through
//! [`QueryHandle`]s; only the client's own resolution path ever writes the
//! cache.
//!
//! ## Example
//!
//! ```no_run
//! use gangway_client::{ClientConfig, QueryClient, QueryRequest};
//! use gangway_common::{NavContext, QueryPolicy, StaticLocation};
//!
//! # async fn example() -> Result<(), gangway_client::QueryError> {
//! let client = QueryClient::new(
//!     ClientConfig::default().with_base_url("https://shop.example"),
//!     StaticLocation::shared(NavContext::new("shop.example", "?id_token=abc")),
//! )?;
//!
//! // Subscribe and let the value settle in the background...
//! let mut count = client.query(QueryRequest::new("/api/products/count"));
//! let snapshot = count.settled().await;
//! println!("count: {:?}", snapshot.data);
//!
//! // ...or resolve imperatively through the same cache.
//! let value = client.fetch(&QueryRequest::new("/api/products/count")).await?;
//! println!("value: {value}");
//! # Ok(())
//! # }
//! ```

/// The query client and its configuration.
pub mod client;
/// Error taxonomy for query resolution.
pub mod error;
/// Result handles observed by UI layers.
pub mod handle;
/// Query descriptors and identity derivation.
pub mod request;

mod store;

pub use client::{ClientConfig, DEFAULT_TIMEOUT, QueryClient};
pub use error::QueryError;
pub use handle::QueryHandle;
pub use request::QueryRequest;
pub use store::QuerySnapshot;
