//! # gangway
//!
//! Data access and frame-exit navigation for applications embedded inside a
//! hosting platform's iframe shell.
//!
//! Two cooperating pieces, neither depending on the other:
//!
//! - the **query client** ([`QueryClient`], from `gangway-client`): attaches
//!   the platform-issued session credential to every request and manages the
//!   request lifecycle (timeout, cache, dedup, retry)
//! - the **exit controller** ([`exit::ExitController`]): handles the
//!   platform's exit-iframe handshake, navigating the hosting shell out of
//!   the frame only for same-origin targets
//!
//! [`actions::DataAction`] rounds this out for imperative mutations that
//! report through the shell's toast capability.
//!
//! ## Example
//!
//! ```no_run
//! use gangway::{ClientConfig, QueryClient, QueryRequest};
//! use gangway::exit::ExitController;
//! use gangway_common::{NavContext, StaticLocation};
//!
//! # async fn example() -> Result<(), gangway::QueryError> {
//! let nav = NavContext::new("shop.example", "?id_token=abc");
//! let client = QueryClient::new(
//!     ClientConfig::default().with_base_url("https://shop.example"),
//!     StaticLocation::shared(nav.clone()),
//! )?;
//!
//! let mut products = client.query(QueryRequest::new("/api/products/count"));
//! let snapshot = products.settled().await;
//! println!("count: {:?}", snapshot.data);
//!
//! // On the exit page, hand the controller its inputs as they arrive.
//! let mut controller = ExitController::new();
//! controller.location_changed(nav);
//! # Ok(())
//! # }
//! ```

/// Imperative data actions with shell feedback.
pub mod actions;
/// The frame-exit navigation handshake.
pub mod exit;

pub use actions::DataAction;
pub use exit::{ExitController, ExitDirective, ExitPhase};

pub use gangway_client::{
    ClientConfig, DEFAULT_TIMEOUT, QueryClient, QueryError, QueryHandle, QueryRequest,
    QuerySnapshot,
};
pub use gangway_common::{
    LocationSource, NavContext, QueryPolicy, SessionCredential, ShellBridge, SharedShell,
    StaticLocation,
};
