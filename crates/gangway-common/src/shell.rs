//! Capability interface of the hosting shell.
//!
//! The platform embeds the app in an iframe and exposes a small bridge
//! object for crossing the frame boundary. The bridge connects
//! asynchronously after the page loads, so consumers hold an
//! `Option<SharedShell>` and must guard every call site on availability;
//! a disconnected shell degrades to no action, never to a crash.

use std::sync::Arc;

/// The navigation, loading, and toast capabilities exposed by the shell.
///
/// Only these three capabilities are consumed; the bridge object's other
/// surface is out of scope for this layer.
pub trait ShellBridge: Send + Sync {
    /// Asks the shell to navigate the top-level frame to `url`.
    fn navigate(&self, url: &str);

    /// Shows or hides the shell's global loading indicator.
    fn loading(&self, shown: bool);

    /// Displays a transient notification.
    fn toast(&self, message: &str, is_error: bool);
}

/// A shared handle to the hosting shell bridge.
pub type SharedShell = Arc<dyn ShellBridge>;
